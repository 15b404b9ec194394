use crate::assembler::lang::Builder;
use crate::isa::types::schema::{ArgType, InstDef};

// The native instruction set occupies opcodes $00-$7F. Opcodes are grouped in blocks of
// 16 by function; gaps are reserved. Anything from $80 upwards belongs to `.extinstr`.

fn gen_ctl(builder: &mut Builder) {
    builder.register(InstDef::with_0("NOP", 0x00));
    builder.register(InstDef::with_0("HALT", 0x01));
    builder.register(InstDef::with_0("RET", 0x06));
    // End of procedure, closes every symbol body.
    builder.register(InstDef::with_0("EOP", 0x07));
    builder.register(InstDef::with_1("CALL", 0x08, ArgType::InternSymbol));
    builder.register(InstDef::with_2(
        "CALLX",
        0x09,
        ArgType::Module,
        ArgType::ExternSymbol,
    ));
    builder.register(InstDef::with_1("SYMREF", 0x0A, ArgType::InternSymbol));
    builder.register(InstDef::with_1("MODREF", 0x0B, ArgType::Module));
}

fn gen_jmp(builder: &mut Builder) {
    builder.register(InstDef::with_1("JMP", 0x10, ArgType::Label));
    builder.register(InstDef::with_1("JZ", 0x11, ArgType::Label));
    builder.register(InstDef::with_1("JNZ", 0x12, ArgType::Label));
    builder.register(InstDef::with_1("JFW", 0x13, ArgType::ShortLabelFw));
    builder.register(InstDef::with_1("JBW", 0x14, ArgType::ShortLabelBw));
    builder.register(InstDef::with_1("JZFW", 0x15, ArgType::ShortLabelFw));
    builder.register(InstDef::with_1("JZBW", 0x16, ArgType::ShortLabelBw));
    builder.register(InstDef::with_1("JNZFW", 0x17, ArgType::ShortLabelFw));
    builder.register(InstDef::with_1("JNZBW", 0x18, ArgType::ShortLabelBw));
}

fn gen_stack(builder: &mut Builder) {
    builder.register(InstDef::with_1("PUSH", 0x20, ArgType::Number));
    builder.register(InstDef::with_1("PUSHB", 0x21, ArgType::Byte));
    builder.register(InstDef::with_0("POP", 0x22));
    builder.register(InstDef::with_0("DUP", 0x23));
    builder.register(InstDef::with_0("SWAP", 0x24));
    builder.register(InstDef::with_0("OVER", 0x25));
    builder.register(InstDef::with_1("LOAD", 0x26, ArgType::Byte));
    builder.register(InstDef::with_1("STORE", 0x27, ArgType::Byte));
    builder.register(InstDef::with_1("ALLOC", 0x28, ArgType::Number));
    builder.register(InstDef::with_0("FREE", 0x29));
}

fn gen_alu(builder: &mut Builder) {
    for (idx, name) in [
        "ADD", "SUB", "MUL", "DIV", "MOD", "NEG", "AND", "OR", "XOR", "NOT", "SHL", "SHR",
    ]
    .iter()
    .enumerate()
    {
        builder.register(InstDef::with_0(name, 0x30 + idx as u8));
    }

    for (idx, name) in ["EQ", "NE", "LT", "LE", "GT", "GE"].iter().enumerate() {
        builder.register(InstDef::with_0(name, 0x40 + idx as u8));
    }
}

fn gen_const(builder: &mut Builder) {
    builder.register(InstDef::with_1("LDA", 0x50, ArgType::Array));
    builder.register(InstDef::with_1("LDBA", 0x51, ArgType::ByteArray));
    builder.register(InstDef::with_1("LDS", 0x52, ArgType::String));
    builder.register(InstDef::with_1("LDD", 0x53, ArgType::Data));
    builder.register(InstDef::with_1("LDV", 0x54, ArgType::Values));
    builder.register(InstDef::with_2("LDVI", 0x55, ArgType::Values, ArgType::Byte));
    builder.register(InstDef::with_0("LEN", 0x56));
}

fn gen_sys(builder: &mut Builder) {
    builder.register(InstDef::with_0("PRINT", 0x70));
    builder.register(InstDef::with_0("PRINTS", 0x71));
    builder.register(InstDef::with_0("INPUT", 0x72));
    builder.register(InstDef::with_1("DBG", 0x7F, ArgType::Anything));
}

pub(crate) fn register(builder: &mut Builder) {
    gen_ctl(builder);
    gen_jmp(builder);
    gen_stack(builder);
    gen_alu(builder);
    gen_const(builder);
    gen_sys(builder);
}
