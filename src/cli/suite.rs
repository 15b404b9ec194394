use crate::assembler::{self, model::ConstantTable, Diagnostic};
use crate::{assets, common};
use ansi_term::Color::{Green, Red};
use derive_more::Constructor;
use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};

/// Units whose name starts with this must be rejected by the assembler.
pub const REJECT_PREFIX: &str = "fail_";

#[derive(Debug, Constructor)]
pub struct UnitSrc {
    pub name: OsString,
    pub root: PathBuf,
}

#[derive(Debug)]
pub enum Outcome {
    Assembled(usize),
    Rejected(Diagnostic),
}

impl UnitSrc {
    pub fn expects_rejection(&self) -> bool {
        self.name.to_string_lossy().starts_with(REJECT_PREFIX)
    }

    pub fn assemble(&self, include_dirs: &[PathBuf], defines: &ConstantTable) -> Outcome {
        let root = self.root.to_string_lossy();
        match assembler::assemble(&root, include_dirs.to_vec(), defines) {
            Ok(bytes) => Outcome::Assembled(bytes.len()),
            Err(diag) => Outcome::Rejected(diag),
        }
    }
}

fn has_source_ext(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map_or(false, |ext| common::eq_ignore_case(ext, assets::SOURCE_EXT))
}

fn find_file_unit(path: &Path) -> Option<UnitSrc> {
    if !has_source_ext(path) {
        return None;
    }

    Some(UnitSrc::new(path.file_stem()?.to_owned(), path.to_owned()))
}

/// A directory unit is assembled from its `main.cws`, which may include its siblings.
fn find_dir_unit(path: &Path) -> Option<UnitSrc> {
    let root = path.join("main").with_extension(assets::SOURCE_EXT);
    if !root.is_file() {
        return None;
    }

    Some(UnitSrc::new(path.file_name()?.to_owned(), root))
}

pub fn find_units(suite_dir: &Path) -> io::Result<Vec<UnitSrc>> {
    let mut units = Vec::new();
    for entry in suite_dir.read_dir()? {
        let entry = entry?;
        let path = entry.path();

        let typ = entry.file_type()?;
        let unit = if typ.is_file() {
            find_file_unit(&path)
        } else if typ.is_dir() {
            find_dir_unit(&path)
        } else {
            None
        };
        units.extend(unit);
    }

    units.sort_unstable_by(|unit1, unit2| unit1.name.cmp(&unit2.name));
    Ok(units)
}

/// Assembles every unit in `suite_dir`, returning whether each one met its expectation.
pub fn run_suite(
    suite_dir: &Path,
    include_dirs: &[PathBuf],
    defines: &ConstantTable,
) -> io::Result<bool> {
    let units = find_units(suite_dir)?;

    let mut include_dirs = include_dirs.to_vec();
    let shared = assets::default_include_dir();
    if shared.is_dir() && !include_dirs.contains(&shared) {
        include_dirs.push(shared);
    }

    Ok(run_units(
        &suite_dir.to_string_lossy(),
        &units,
        &include_dirs,
        defines,
    ))
}

fn run_units(
    name: &str,
    units: &[UnitSrc],
    include_dirs: &[PathBuf],
    defines: &ConstantTable,
) -> bool {
    let name_pad = units.iter().map(|unit| unit.name.len()).max().unwrap_or(0);

    println!("Running suite: '{}' ({} units)", name, units.len());
    println!("{:-<line_len$}", "", line_len = name_pad + 45);

    let passes = units
        .iter()
        .enumerate()
        .filter(|(num, unit)| run_unit(unit, num + 1, name_pad, include_dirs, defines))
        .count();
    let success = passes == units.len();

    println!("{:-<line_len$}", "", line_len = name_pad + 45);
    println!(
        "Suite Result: {}, {}/{} passes",
        if success {
            Green.bold().paint("SUCCESS")
        } else {
            Red.bold().paint("FAILED")
        },
        passes,
        units.len()
    );

    success
}

fn run_unit(
    src: &UnitSrc,
    num: usize,
    name_pad: usize,
    include_dirs: &[PathBuf],
    defines: &ConstantTable,
) -> bool {
    let outcome = src.assemble(include_dirs, defines);

    let (success, msg) = match (outcome, src.expects_rejection()) {
        (Outcome::Assembled(len), false) => (
            true,
            format!("{} {:6} bytes", Green.bold().paint("PASS"), len),
        ),
        (Outcome::Assembled(len), true) => (
            false,
            format!(
                "{} ({} bytes)",
                Red.bold().paint("FAIL: ACCEPTED INVALID SOURCE"),
                len
            ),
        ),
        (Outcome::Rejected(diag), true) => (
            true,
            format!("{} (rejected: {})", Green.bold().paint("PASS"), diag.kind()),
        ),
        (Outcome::Rejected(diag), false) => (
            false,
            format!(
                "{}:\n\t{}",
                Red.bold().paint("FAIL: ASSEMBLY ERROR"),
                diag.to_string().replace("\n", "\n\t")
            ),
        ),
    };

    println!(
        "Unit {:2 }: {} {}{}",
        num,
        src.name.to_string_lossy(),
        " ".repeat(name_pad - src.name.len()),
        msg
    );

    success
}
