//! # Boot entry microcode patcher
//!
//! Keeps the CPU early-microcode image loaded before the initramfs in
//! Boot Loader Specification (Type #1) entries, as used by systemd-boot.
//!
//! The `bls-ucode` binary (`crates/cli`) is a thin wrapper that delegates
//! to [`cli::run_from_iter`]. Everything else is internal.

pub mod cli;
mod config;
mod entries;
mod error;
pub(crate) mod parsers;
mod patch;
mod report;
mod run;
mod writeback;
