//! Parsers for the files we edit.

pub(crate) mod bls_entry;
