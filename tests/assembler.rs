use cwasm::assembler::{
    self, disasm,
    lang::Lang,
    model::{Binary, BinaryKind, ConstantTable},
    phases::{
        compile,
        preprocess::{self, MemoryProvider},
        types::{ErrorKind, Loc},
    },
    Diagnostic, Error,
};
use cwasm::isa::types::hw::BitWidth;

fn build(files: &[(&str, &str)]) -> Result<Binary, Diagnostic> {
    let mut provider = MemoryProvider::new();
    for (name, text) in files {
        provider.insert(name, text);
    }
    assembler::build_with(&mut provider, files[0].0, &ConstantTable::new())
}

#[test]
fn minimal_program_end_to_end() {
    let bytes = assembler::assemble_str(".cwx:16\n.symbol main\nnop\neop\n").unwrap();
    let binary = disasm::read(&bytes).unwrap();

    assert_eq!(binary.ty.kind, BinaryKind::Executable);
    assert_eq!(binary.ty.width, BitWidth::W16);
    assert_eq!(bytes[5], 0b010);
    assert!(binary.slots.is_empty());
    assert!(binary.constants.is_empty());
    assert_eq!(binary.symbols.len(), 1);
    assert_eq!(binary.symbols[0].index, 0);
    assert_eq!(binary.symbols[0].body, vec![0x00, 0x07]);
}

#[test]
fn read_back_and_disassemble() {
    let source = concat!(
        ".cwx:32\n",
        ".title \"demo\"\n",
        ".module io, 2\n",
        ".extern print_line, 3\n",
        ".vals table, [1, -1]\n",
        ".symbol main\n",
        "start: ldv table\n",
        "callx io, print_line\n",
        "jmp start\n",
    );
    let bytes = assembler::assemble_str(source).unwrap();
    let binary = disasm::read(&bytes).unwrap();

    assert_eq!(binary.meta.title, "demo");
    assert_eq!(binary.slots[0].name, "io");
    assert_eq!(
        binary.constants,
        vec![vec![1, 0, 0, 0, 0xFF, 0xFF, 0xFF, 0xFF]]
    );

    let lang = Lang::new();
    let listing = disasm::disassemble(&binary.symbols[0].body, &lang, binary.ty.width)
        .unwrap()
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>();
    assert_eq!(
        listing,
        vec![
            "ldv values#0",
            "callx module#2, externsymbol#3",
            "jmp 4294967291",
        ]
    );
}

#[test]
fn includes_and_conditionals() {
    let binary = build(&[
        (
            "main.cws",
            concat!(
                ".cwl:16\n",
                "#include \"config.cws\"\n",
                "#include \"config.cws\"\n",
                ".symbol f\n",
                "#ifdef FAST\n",
                "pushb SPEED\n",
                "#else\n",
                "pushb 1\n",
                "#endif\n",
                "ret\n",
            ),
        ),
        (
            "config.cws",
            "#ifndef CONFIG\n#define CONFIG\n#define FAST\n#define SPEED (2 << 3)\n#endif\n",
        ),
    ])
    .unwrap();

    assert_eq!(binary.ty.kind, BinaryKind::Library);
    assert_eq!(binary.symbol("f").unwrap().body, vec![0x21, 16, 0x06]);
}

#[test]
fn errors_carry_their_location() {
    let diag = build(&[("main.cws", ".cwx:16\n.symbol main\n  push\n")]).unwrap_err();
    assert_eq!(diag.kind(), ErrorKind::Argument);
    assert_eq!(diag.file.as_deref(), Some("main.cws"));

    assert_eq!(diag.error.loc(), Some(Loc::new(0, 3, 3)));
    assert!(matches!(
        diag.error.value(),
        Error::Compile(compile::Error::ArgCount {
            expected: 1,
            found: 0,
            ..
        })
    ));
}

#[test]
fn missing_includes_are_io_errors() {
    let diag = build(&[("main.cws", ".cwx:16\n#include \"nope.cws\"\n")]).unwrap_err();
    assert_eq!(diag.kind(), ErrorKind::Io);
    assert!(matches!(
        diag.error.value(),
        Error::Preprocess(preprocess::Error::Include(..))
    ));
}

#[test]
fn lexical_errors_surface_first() {
    let diag = build(&[("main.cws", ".cwx:16\n.symbol main\npush 1 @\n")]).unwrap_err();
    assert_eq!(diag.kind(), ErrorKind::Lexical);
    assert_eq!(diag.error.loc(), Some(Loc::new(0, 3, 8)));
}

#[test]
fn header_is_mandatory() {
    let diag = assembler::assemble_str(".symbol main\neop\n").unwrap_err();
    assert_eq!(diag.kind(), ErrorKind::Structural);

    let diag = assembler::assemble_str(".cwx:12\n").unwrap_err();
    assert_eq!(diag.kind(), ErrorKind::Structural);
    assert!(diag.to_string().contains("12"));
}
