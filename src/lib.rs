#![allow(ambiguous_associated_items)]

pub mod assets;
pub(crate) mod common;

pub mod isa;

pub mod assembler;

pub mod cli;
