//! Streaming zip container writer.
//!
//! Emits a standard zip archive to a non-seekable sink, entry by entry, as
//! each source stream is drained. Compressed bytes for an entry are first
//! collected in a bounded in-memory spool; an entry that completes within
//! the spool is written with exact sizes in its local header, while an entry
//! that outgrows the spool switches to streaming mode (data-descriptor flag,
//! zip64 sizes). Source failures inside the spool window leave no bytes in
//! the output; failures after the switch close the entry and drop it from
//! the central directory, so readers never see it.

use bytes::Bytes;
use chrono::{Datelike, Timelike, Utc};
use flate2::write::DeflateEncoder;
use flate2::{Compression, Crc};
use futures::Stream;
use futures::StreamExt;
use std::io::Write;
use thiserror::Error;
use tokio::io::{AsyncWrite, AsyncWriteExt};

const LOCAL_HEADER_SIG: u32 = 0x0403_4b50;
const DATA_DESCRIPTOR_SIG: u32 = 0x0807_4b50;
const CENTRAL_DIR_SIG: u32 = 0x0201_4b50;
const EOCD_SIG: u32 = 0x0605_4b50;
const ZIP64_EOCD_SIG: u32 = 0x0606_4b50;
const ZIP64_EOCD_LOCATOR_SIG: u32 = 0x0706_4b50;
const ZIP64_EXTRA_ID: u16 = 0x0001;

const VERSION_DEFLATE: u16 = 20;
const VERSION_ZIP64: u16 = 45;
const VERSION_MADE_BY: u16 = (3 << 8) | VERSION_ZIP64; // unix
const FLAG_DATA_DESCRIPTOR: u16 = 1 << 3;
const METHOD_DEFLATE: u16 = 8;
const EXTERNAL_ATTRS: u32 = 0o100644 << 16; // -rw-r--r--

const U32_MARKER: u64 = 0xFFFF_FFFF;
const U16_MARKER: u64 = 0xFFFF;

/// Default bound on the per-entry compressed spool.
pub const DEFAULT_ENTRY_SPOOL_BYTES: usize = 4 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum ArchiveError {
    /// The entry's source stream failed mid-write. The entry is absent from
    /// the finished archive; remaining items are unaffected.
    #[error("archive entry {file_name} aborted: {reason}")]
    EntryAborted { file_name: String, reason: String },

    /// The archive output sink failed. Fatal for the whole archive.
    #[error("archive output error: {0}")]
    Io(#[from] std::io::Error),
}

struct EntryRecord {
    name: Vec<u8>,
    crc32: u32,
    compressed_size: u64,
    uncompressed_size: u64,
    local_header_offset: u64,
    dos_time: u16,
    dos_date: u16,
    streamed: bool,
}

/// Streaming zip writer over an async byte sink.
///
/// Entries appear in the finished archive in append order.
pub struct ZipStreamWriter<W> {
    writer: W,
    level: Compression,
    spool_limit: usize,
    offset: u64,
    entries: Vec<EntryRecord>,
}

impl<W> ZipStreamWriter<W>
where
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(writer: W, compression_level: u32) -> Self {
        Self {
            writer,
            level: Compression::new(compression_level),
            spool_limit: DEFAULT_ENTRY_SPOOL_BYTES,
            offset: 0,
            entries: Vec::new(),
        }
    }

    /// Override the per-entry spool bound. Smaller spools trade memory for
    /// more entries taking the streaming (data-descriptor) path.
    pub fn with_spool_limit(mut self, spool_limit: usize) -> Self {
        self.spool_limit = spool_limit.max(1);
        self
    }

    /// Number of entries written so far.
    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    /// Drain `stream` into a new archive entry named `name`.
    ///
    /// Returns the number of uncompressed bytes written. On a source-stream
    /// error the entry is dropped as a whole and the writer stays usable for
    /// the next entry.
    pub async fn append_entry<S, E>(
        &mut self,
        name: &str,
        mut stream: S,
    ) -> Result<u64, ArchiveError>
    where
        S: Stream<Item = Result<Bytes, E>> + Unpin + Send,
        E: std::fmt::Display,
    {
        let (dos_time, dos_date) = dos_datetime();
        let name_bytes = name.as_bytes().to_vec();

        let mut encoder = DeflateEncoder::new(Vec::new(), self.level);
        let mut crc = Crc::new();
        let mut uncompressed: u64 = 0;
        let mut compressed: u64 = 0;
        let mut spool: Vec<u8> = Vec::new();
        let mut streamed = false;
        let mut local_header_offset = self.offset;

        while let Some(chunk) = stream.next().await {
            let bytes = match chunk {
                Ok(bytes) => bytes,
                Err(e) => {
                    if streamed {
                        // The local header is already in the output; close
                        // the entry so offsets stay consistent, but leave it
                        // out of the central directory.
                        let tail = encoder.finish()?;
                        compressed += tail.len() as u64;
                        self.write_out(&tail).await?;
                        self.write_out(&zip64_data_descriptor(
                            crc.sum(),
                            compressed,
                            uncompressed,
                        ))
                        .await?;
                        tracing::warn!(
                            entry = %name,
                            bytes_discarded = compressed,
                            "Source stream failed mid-entry; entry closed and omitted from directory"
                        );
                    }
                    return Err(ArchiveError::EntryAborted {
                        file_name: name.to_string(),
                        reason: e.to_string(),
                    });
                }
            };

            crc.update(&bytes);
            uncompressed += bytes.len() as u64;
            encoder.write_all(&bytes)?;
            let produced = std::mem::take(encoder.get_mut());

            if !streamed {
                spool.extend_from_slice(&produced);
                if spool.len() > self.spool_limit {
                    // Spool overflow: commit to the output and switch to
                    // streaming mode for the rest of this entry.
                    local_header_offset = self.offset;
                    self.write_out(&streaming_local_header(&name_bytes, dos_time, dos_date))
                        .await?;
                    let flushed = std::mem::take(&mut spool);
                    compressed += flushed.len() as u64;
                    self.write_out(&flushed).await?;
                    streamed = true;
                }
            } else {
                compressed += produced.len() as u64;
                self.write_out(&produced).await?;
            }
        }

        let tail = encoder.finish()?;
        let crc32 = crc.sum();

        if streamed {
            compressed += tail.len() as u64;
            self.write_out(&tail).await?;
            self.write_out(&zip64_data_descriptor(crc32, compressed, uncompressed))
                .await?;
        } else {
            spool.extend_from_slice(&tail);
            compressed = spool.len() as u64;
            local_header_offset = self.offset;
            self.write_out(&local_header(
                &name_bytes,
                dos_time,
                dos_date,
                crc32,
                compressed,
                uncompressed,
            ))
            .await?;
            self.write_out(&spool).await?;
        }

        self.entries.push(EntryRecord {
            name: name_bytes,
            crc32,
            compressed_size: compressed,
            uncompressed_size: uncompressed,
            local_header_offset,
            dos_time,
            dos_date,
            streamed,
        });

        tracing::debug!(
            entry = %name,
            uncompressed_bytes = uncompressed,
            compressed_bytes = compressed,
            streamed,
            "Archive entry written"
        );

        Ok(uncompressed)
    }

    /// Write the central directory and end-of-central-directory records,
    /// flush the sink, and return the total archive size in bytes.
    pub async fn finish(mut self) -> Result<u64, ArchiveError> {
        let cd_start = self.offset;

        let records = std::mem::take(&mut self.entries);
        for entry in &records {
            let record = central_dir_record(entry);
            self.write_out(&record).await?;
        }
        let cd_size = self.offset - cd_start;

        let needs_zip64 = records.len() as u64 > U16_MARKER
            || cd_size >= U32_MARKER
            || cd_start >= U32_MARKER;
        if needs_zip64 {
            let zip64_eocd_offset = self.offset;
            self.write_out(&zip64_eocd(records.len() as u64, cd_size, cd_start))
                .await?;
            self.write_out(&zip64_eocd_locator(zip64_eocd_offset))
                .await?;
        }
        self.write_out(&eocd(records.len() as u64, cd_size, cd_start))
            .await?;

        self.writer.flush().await?;
        self.writer.shutdown().await?;

        tracing::debug!(
            entries = records.len(),
            total_bytes = self.offset,
            "Archive finalized"
        );

        Ok(self.offset)
    }

    async fn write_out(&mut self, buf: &[u8]) -> Result<(), ArchiveError> {
        self.writer.write_all(buf).await?;
        self.offset += buf.len() as u64;
        Ok(())
    }
}

/// Current UTC time as DOS (time, date) words. Years before the DOS epoch
/// clamp to 1980.
fn dos_datetime() -> (u16, u16) {
    let now = Utc::now();
    let year = now.year().max(1980) as u16;
    let time =
        ((now.hour() as u16) << 11) | ((now.minute() as u16) << 5) | (now.second() as u16 / 2);
    let date = ((year - 1980) << 9) | ((now.month() as u16) << 5) | now.day() as u16;
    (time, date)
}

fn put_u16(buf: &mut Vec<u8>, v: u16) {
    buf.extend_from_slice(&v.to_le_bytes());
}

fn put_u32(buf: &mut Vec<u8>, v: u32) {
    buf.extend_from_slice(&v.to_le_bytes());
}

fn put_u64(buf: &mut Vec<u8>, v: u64) {
    buf.extend_from_slice(&v.to_le_bytes());
}

/// Local header for an entry whose sizes are known up front.
fn local_header(
    name: &[u8],
    dos_time: u16,
    dos_date: u16,
    crc32: u32,
    compressed: u64,
    uncompressed: u64,
) -> Vec<u8> {
    let zip64 = compressed >= U32_MARKER || uncompressed >= U32_MARKER;
    let mut buf = Vec::with_capacity(30 + name.len() + 20);
    put_u32(&mut buf, LOCAL_HEADER_SIG);
    put_u16(
        &mut buf,
        if zip64 { VERSION_ZIP64 } else { VERSION_DEFLATE },
    );
    put_u16(&mut buf, 0); // flags
    put_u16(&mut buf, METHOD_DEFLATE);
    put_u16(&mut buf, dos_time);
    put_u16(&mut buf, dos_date);
    put_u32(&mut buf, crc32);
    if zip64 {
        put_u32(&mut buf, U32_MARKER as u32);
        put_u32(&mut buf, U32_MARKER as u32);
    } else {
        put_u32(&mut buf, compressed as u32);
        put_u32(&mut buf, uncompressed as u32);
    }
    put_u16(&mut buf, name.len() as u16);
    put_u16(&mut buf, if zip64 { 20 } else { 0 }); // extra length
    buf.extend_from_slice(name);
    if zip64 {
        put_u16(&mut buf, ZIP64_EXTRA_ID);
        put_u16(&mut buf, 16);
        put_u64(&mut buf, uncompressed);
        put_u64(&mut buf, compressed);
    }
    buf
}

/// Local header for a streamed entry: sizes deferred to the data
/// descriptor, zip64 throughout since the final sizes are unknown.
fn streaming_local_header(name: &[u8], dos_time: u16, dos_date: u16) -> Vec<u8> {
    let mut buf = Vec::with_capacity(30 + name.len() + 20);
    put_u32(&mut buf, LOCAL_HEADER_SIG);
    put_u16(&mut buf, VERSION_ZIP64);
    put_u16(&mut buf, FLAG_DATA_DESCRIPTOR);
    put_u16(&mut buf, METHOD_DEFLATE);
    put_u16(&mut buf, dos_time);
    put_u16(&mut buf, dos_date);
    put_u32(&mut buf, 0); // crc in descriptor
    put_u32(&mut buf, U32_MARKER as u32);
    put_u32(&mut buf, U32_MARKER as u32);
    put_u16(&mut buf, name.len() as u16);
    put_u16(&mut buf, 20);
    buf.extend_from_slice(name);
    put_u16(&mut buf, ZIP64_EXTRA_ID);
    put_u16(&mut buf, 16);
    put_u64(&mut buf, 0);
    put_u64(&mut buf, 0);
    buf
}

/// Zip64 data descriptor (8-byte sizes, as required when the local header
/// carries a zip64 extra field).
fn zip64_data_descriptor(crc32: u32, compressed: u64, uncompressed: u64) -> Vec<u8> {
    let mut buf = Vec::with_capacity(24);
    put_u32(&mut buf, DATA_DESCRIPTOR_SIG);
    put_u32(&mut buf, crc32);
    put_u64(&mut buf, compressed);
    put_u64(&mut buf, uncompressed);
    buf
}

fn central_dir_record(entry: &EntryRecord) -> Vec<u8> {
    let mut zip64_extra = Vec::new();
    if entry.uncompressed_size >= U32_MARKER {
        put_u64(&mut zip64_extra, entry.uncompressed_size);
    }
    if entry.compressed_size >= U32_MARKER {
        put_u64(&mut zip64_extra, entry.compressed_size);
    }
    if entry.local_header_offset >= U32_MARKER {
        put_u64(&mut zip64_extra, entry.local_header_offset);
    }

    let zip64 = !zip64_extra.is_empty();
    let version_needed = if zip64 || entry.streamed {
        VERSION_ZIP64
    } else {
        VERSION_DEFLATE
    };

    let mut buf = Vec::with_capacity(46 + entry.name.len() + 4 + zip64_extra.len());
    put_u32(&mut buf, CENTRAL_DIR_SIG);
    put_u16(&mut buf, VERSION_MADE_BY);
    put_u16(&mut buf, version_needed);
    put_u16(
        &mut buf,
        if entry.streamed {
            FLAG_DATA_DESCRIPTOR
        } else {
            0
        },
    );
    put_u16(&mut buf, METHOD_DEFLATE);
    put_u16(&mut buf, entry.dos_time);
    put_u16(&mut buf, entry.dos_date);
    put_u32(&mut buf, entry.crc32);
    put_u32(&mut buf, entry.compressed_size.min(U32_MARKER) as u32);
    put_u32(&mut buf, entry.uncompressed_size.min(U32_MARKER) as u32);
    put_u16(&mut buf, entry.name.len() as u16);
    put_u16(
        &mut buf,
        if zip64 {
            (4 + zip64_extra.len()) as u16
        } else {
            0
        },
    );
    put_u16(&mut buf, 0); // comment length
    put_u16(&mut buf, 0); // disk number
    put_u16(&mut buf, 0); // internal attrs
    put_u32(&mut buf, EXTERNAL_ATTRS);
    put_u32(&mut buf, entry.local_header_offset.min(U32_MARKER) as u32);
    buf.extend_from_slice(&entry.name);
    if zip64 {
        put_u16(&mut buf, ZIP64_EXTRA_ID);
        put_u16(&mut buf, zip64_extra.len() as u16);
        buf.extend_from_slice(&zip64_extra);
    }
    buf
}

fn zip64_eocd(entries: u64, cd_size: u64, cd_offset: u64) -> Vec<u8> {
    let mut buf = Vec::with_capacity(56);
    put_u32(&mut buf, ZIP64_EOCD_SIG);
    put_u64(&mut buf, 44); // size of remaining record
    put_u16(&mut buf, VERSION_MADE_BY);
    put_u16(&mut buf, VERSION_ZIP64);
    put_u32(&mut buf, 0); // this disk
    put_u32(&mut buf, 0); // disk with central directory
    put_u64(&mut buf, entries);
    put_u64(&mut buf, entries);
    put_u64(&mut buf, cd_size);
    put_u64(&mut buf, cd_offset);
    buf
}

fn zip64_eocd_locator(zip64_eocd_offset: u64) -> Vec<u8> {
    let mut buf = Vec::with_capacity(20);
    put_u32(&mut buf, ZIP64_EOCD_LOCATOR_SIG);
    put_u32(&mut buf, 0); // disk with the zip64 eocd
    put_u64(&mut buf, zip64_eocd_offset);
    put_u32(&mut buf, 1); // total disks
    buf
}

fn eocd(entries: u64, cd_size: u64, cd_offset: u64) -> Vec<u8> {
    let mut buf = Vec::with_capacity(22);
    put_u32(&mut buf, EOCD_SIG);
    put_u16(&mut buf, 0); // this disk
    put_u16(&mut buf, 0); // disk with central directory
    put_u16(&mut buf, entries.min(U16_MARKER) as u16);
    put_u16(&mut buf, entries.min(U16_MARKER) as u16);
    put_u32(&mut buf, cd_size.min(U32_MARKER) as u32);
    put_u32(&mut buf, cd_offset.min(U32_MARKER) as u32);
    put_u16(&mut buf, 0); // comment length
    buf
}
