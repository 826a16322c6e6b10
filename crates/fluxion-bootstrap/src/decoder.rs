// Copyright (c) 2025 SOLARE S.R.O.
//
// This file is part of FluxION.
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// (CC BY-NC-ND 4.0). You may use and share this file for non-commercial purposes only and you may not
// create derivatives. See <https://creativecommons.org/licenses/by-nc-nd/4.0/>.
//
// This software is provided "AS IS", without warranty of any kind.
//
// For commercial licensing, please contact: info@solare.cz

//! Payload decoders
//!
//! The installed payload is stored encoded. Before launch it is decoded into the entry point
//! file; the output is written next to its destination and renamed into place.

use crate::config::PayloadFormat;
use crate::error::{BootstrapError, Result};
use flate2::read::GzDecoder;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Opaque byte stream transform from the installed payload to the launchable entry point.
pub trait Decoder: Send + Sync + std::fmt::Debug {
    fn decode(&self, input: &Path, output: &Path) -> Result<()>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LzmaDecoder;

#[derive(Debug, Default, Clone, Copy)]
pub struct XzDecoder;

#[derive(Debug, Default, Clone, Copy)]
pub struct GzipDecoder;

/// Plain copy for payloads stored unencoded.
#[derive(Debug, Default, Clone, Copy)]
pub struct RawDecoder;

#[must_use]
pub fn decoder_for(format: PayloadFormat) -> Box<dyn Decoder> {
    match format {
        PayloadFormat::Lzma => Box::new(LzmaDecoder),
        PayloadFormat::Xz => Box::new(XzDecoder),
        PayloadFormat::Gzip => Box::new(GzipDecoder),
        PayloadFormat::Raw => Box::new(RawDecoder),
    }
}

impl Decoder for LzmaDecoder {
    fn decode(&self, input: &Path, output: &Path) -> Result<()> {
        write_atomically(input, output, |reader, writer| {
            lzma_rs::lzma_decompress(reader, writer).map_err(|e| e.to_string())
        })
    }
}

impl Decoder for XzDecoder {
    fn decode(&self, input: &Path, output: &Path) -> Result<()> {
        write_atomically(input, output, |reader, writer| {
            lzma_rs::xz_decompress(reader, writer).map_err(|e| e.to_string())
        })
    }
}

impl Decoder for GzipDecoder {
    fn decode(&self, input: &Path, output: &Path) -> Result<()> {
        write_atomically(input, output, |reader, writer| {
            io::copy(&mut GzDecoder::new(reader), writer)
                .map(|_| ())
                .map_err(|e| e.to_string())
        })
    }
}

impl Decoder for RawDecoder {
    fn decode(&self, input: &Path, output: &Path) -> Result<()> {
        write_atomically(input, output, |reader, writer| {
            io::copy(reader, writer)
                .map(|_| ())
                .map_err(|e| e.to_string())
        })
    }
}

fn temp_output(output: &Path) -> PathBuf {
    let mut name = output.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

fn write_atomically<F>(input: &Path, output: &Path, transform: F) -> Result<()>
where
    F: FnOnce(&mut BufReader<File>, &mut BufWriter<File>) -> std::result::Result<(), String>,
{
    let decode_error = |reason: String| BootstrapError::Decode {
        path: input.to_path_buf(),
        reason,
    };

    let source = File::open(input).map_err(|e| decode_error(e.to_string()))?;
    let temp = temp_output(output);
    let target = File::create(&temp)
        .map_err(|e| decode_error(format!("cannot create {}: {e}", temp.display())))?;

    let mut reader = BufReader::new(source);
    let mut writer = BufWriter::new(target);
    let written = transform(&mut reader, &mut writer).and_then(|()| {
        writer.flush().map_err(|e| e.to_string())?;
        writer.get_ref().sync_all().map_err(|e| e.to_string())
    });
    drop(writer);

    if let Err(reason) = written.and_then(|()| {
        std::fs::rename(&temp, output)
            .map_err(|e| format!("cannot move output to {}: {e}", output.display()))
    }) {
        let _ = std::fs::remove_file(&temp);
        return Err(decode_error(reason));
    }

    tracing::debug!("Decoded {} into {}", input.display(), output.display());
    Ok(())
}
