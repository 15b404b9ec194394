use super::suite;
use crate::assembler::{
    self, disasm,
    lang::Lang,
    model::{Binary, Constant, ConstantTable},
    phases::types::ErrorKind,
    Diagnostic,
};
use crate::{assets, common};
use ansi_term::Color::{Cyan, Red, Yellow};
use anyhow::Context;
use std::path::{Path, PathBuf};
use structopt::StructOpt;

pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_FAILURE: i32 = 1;
pub const EXIT_IO: i32 = 2;

#[cfg(windows)]
pub fn terminal_init() {
    ansi_term::enable_ansi_support().unwrap_or(());
}

#[cfg(not(windows))]
pub fn terminal_init() {}

/// Installs `env_logger`. `RUST_LOG` still wins over the verbosity flag.
pub fn logging_init(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .try_init()
        .unwrap_or(());
}

fn parse_define(s: &str) -> Result<(String, Constant), String> {
    let (name, val) = match s.find('=') {
        Some(idx) => (&s[..idx], Constant::parse_text(&s[idx + 1..])),
        None => (s, Constant::Empty),
    };

    if name.is_empty() || !name.chars().all(|c| c.is_alphanumeric() || c == '_') {
        return Err(format!("'{}' is not a valid constant name", name));
    }
    Ok((name.to_owned(), val))
}

#[derive(StructOpt, Debug)]
#[structopt(name = "cwasm")]
pub enum CommandRoot {
    Asm(SubcommandAsm),
    Dump(SubcommandDump),
    Suite(SubcommandSuite),
}

#[derive(StructOpt, Debug)]
pub struct GlobalOpts {
    /// Raise the log level (repeatable)
    #[structopt(short, long, parse(from_occurrences))]
    verbose: u8,
}

#[derive(StructOpt, Debug)]
pub struct AsmOpts {
    /// Extra include search directory (repeatable)
    #[structopt(short = "I", long = "include", name = "dir", parse(from_os_str))]
    include_dirs: Vec<PathBuf>,

    /// Predefine a preprocessor constant, NAME or NAME=VALUE
    #[structopt(
        short = "D",
        long = "define",
        name = "NAME[=VALUE]",
        parse(try_from_str = parse_define)
    )]
    defines: Vec<(String, Constant)>,
}

impl AsmOpts {
    fn defines(&self) -> ConstantTable {
        self.defines.iter().cloned().collect()
    }
}

#[derive(StructOpt, Debug)]
#[structopt(name = "cwasm-asm")]
pub struct SubcommandAsm {
    #[structopt(flatten)]
    global: GlobalOpts,

    #[structopt(flatten)]
    opts: AsmOpts,

    #[structopt(name = "in.cws", parse(from_os_str))]
    in_src: PathBuf,

    #[structopt(name = "out.cwx", parse(from_os_str))]
    out_bin: Option<PathBuf>,
}

#[derive(StructOpt, Debug)]
#[structopt(name = "cwdump")]
pub struct SubcommandDump {
    #[structopt(flatten)]
    global: GlobalOpts,

    #[structopt(name = "in.cwx", parse(from_os_str))]
    in_bin: PathBuf,
}

#[derive(StructOpt, Debug)]
pub struct SubcommandSuite {
    #[structopt(flatten)]
    global: GlobalOpts,

    #[structopt(flatten)]
    opts: AsmOpts,

    #[structopt(name = "suite/dir", parse(from_os_str))]
    suite_dir: Option<PathBuf>,
}

pub fn root(cmd: CommandRoot) -> ! {
    match cmd {
        CommandRoot::Asm(scmd) => asm(scmd),
        CommandRoot::Dump(scmd) => dump(scmd),
        CommandRoot::Suite(scmd) => suite(scmd),
    };
}

pub fn print_diagnostic(diag: &Diagnostic) {
    eprintln!(
        "{}: {}",
        Red.bold().paint(diag.kind().to_string()),
        diag.error.inner()
    );
    if let Some(pos) = diag.position() {
        eprintln!("  {} {}", Cyan.bold().paint("-->"), pos);
    }
}

fn exit_code(diag: &Diagnostic) -> i32 {
    match diag.kind() {
        ErrorKind::Io => EXIT_IO,
        _ => EXIT_FAILURE,
    }
}

fn output_path(in_src: &Path, binary: &Binary) -> PathBuf {
    let stem = in_src.file_stem().unwrap_or_else(|| in_src.as_os_str());
    PathBuf::from(stem).with_extension(assets::binary_ext(binary.ty.kind))
}

pub fn asm(cmd: SubcommandAsm) -> ! {
    logging_init(cmd.global.verbose);

    let path = cmd.in_src.to_string_lossy().into_owned();
    let result = assembler::build(&path, cmd.opts.include_dirs.clone(), &cmd.opts.defines())
        .and_then(|binary| {
            let bytes = assembler::assemble_binary(&binary)?;
            Ok((binary, bytes))
        });

    let (binary, bytes) = match result {
        Ok(out) => out,
        Err(diag) => {
            print_diagnostic(&diag);
            std::process::exit(exit_code(&diag));
        }
    };

    let out_name = match cmd.out_bin {
        Some(out_bin) => out_bin,
        None => output_path(&cmd.in_src, &binary),
    };
    if let Err(err) = std::fs::write(&out_name, &bytes) {
        eprintln!(
            "{}: could not write '{}': {}",
            Red.bold().paint("I/O error"),
            out_name.display(),
            err
        );
        std::process::exit(EXIT_IO);
    }

    log::info!("wrote {} byte(s) to '{}'", bytes.len(), out_name.display());
    std::process::exit(EXIT_SUCCESS);
}

fn print_binary(binary: &Binary) {
    let meta = &binary.meta;
    println!("{} {}", Yellow.bold().paint("type:"), binary.ty);
    println!("{} {:?}", Yellow.bold().paint("title:"), meta.title);
    println!("{} {:?}", Yellow.bold().paint("description:"), meta.description);
    println!("{} {:?}", Yellow.bold().paint("author:"), meta.author);
    println!(
        "{} {}.{}.{}",
        Yellow.bold().paint("version:"),
        meta.version[0],
        meta.version[1],
        meta.version[2]
    );
    println!(
        "{} {}.{}.{}",
        Yellow.bold().paint("runtime:"),
        meta.runtime[0],
        meta.runtime[1],
        meta.runtime[2]
    );
    println!(
        "{} stack {}, pool {}, locals {}",
        Yellow.bold().paint("resources:"),
        meta.resources[0],
        meta.resources[1],
        meta.resources[2]
    );

    println!("{} ({})", Yellow.bold().paint("slots"), binary.slots.len());
    for slot in &binary.slots {
        println!(
            "  {:2}: {}{}",
            slot.index,
            slot.name,
            if slot.optional { " (optional)" } else { "" }
        );
    }

    println!("{} ({})", Yellow.bold().paint("constants"), binary.constants.len());
    for (idx, constant) in binary.constants.iter().enumerate() {
        println!("  {:3}: {}", idx, common::hex_bytes(constant));
    }

    let lang = Lang::get_native();
    println!("{} ({})", Yellow.bold().paint("symbols"), binary.symbols.len());
    for symbol in &binary.symbols {
        println!("  #{} ({} bytes)", symbol.index, symbol.body.len());
        match disasm::disassemble(&symbol.body, lang, binary.ty.width) {
            Ok(insts) => {
                for inst in insts {
                    println!("    {:04X}  {}", inst.offset, inst);
                }
            }
            Err(err) => {
                // Extended instructions are not described by the container.
                log::warn!("symbol #{}: {}", symbol.index, err);
                println!("    {}", common::hex_bytes(&symbol.body));
            }
        }
    }
}

fn read_binary(path: &Path) -> Result<Binary, anyhow::Error> {
    let bytes =
        std::fs::read(path).with_context(|| format!("could not read '{}'", path.display()))?;
    Ok(disasm::read(&bytes).with_context(|| format!("'{}' is malformed", path.display()))?)
}

pub fn dump(cmd: SubcommandDump) -> ! {
    logging_init(cmd.global.verbose);

    match read_binary(&cmd.in_bin) {
        Ok(binary) => {
            print_binary(&binary);
            std::process::exit(EXIT_SUCCESS);
        }
        Err(err) => {
            eprintln!("{}: {:#}", Red.bold().paint("error"), err);
            let io = err.downcast_ref::<std::io::Error>().is_some();
            std::process::exit(if io { EXIT_IO } else { EXIT_FAILURE });
        }
    }
}

pub fn suite(cmd: SubcommandSuite) -> ! {
    logging_init(cmd.global.verbose);

    let dir = cmd.suite_dir.unwrap_or_else(assets::default_suite_dir);
    match suite::run_suite(&dir, &cmd.opts.include_dirs, &cmd.opts.defines()) {
        Ok(true) => std::process::exit(EXIT_SUCCESS),
        Ok(false) => std::process::exit(EXIT_FAILURE),
        Err(err) => {
            eprintln!(
                "{}: could not read suite '{}': {}",
                Red.bold().paint("I/O error"),
                dir.display(),
                err
            );
            std::process::exit(EXIT_IO);
        }
    }
}
