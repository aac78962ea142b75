//! Shared helpers for integration tests.

#![allow(dead_code)]

pub mod simulated_provider;
pub mod socket_guard;

use std::io::{Cursor, Write};

/// Builds an in-memory ZIP from `(name, body)` pairs.
#[must_use]
pub fn zip_bundle(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for (name, body) in entries {
        let options = zip::write::SimpleFileOptions::default();
        if name.ends_with('/') {
            writer.add_directory(*name, options).unwrap();
            continue;
        }
        writer.start_file(*name, options).unwrap();
        writer.write_all(body).unwrap();
    }
    writer.finish().unwrap().into_inner()
}
