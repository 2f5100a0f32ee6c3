/*
This code is part of the shpclean shapefile diagnose & repair tool.
Created: 18/03/2024
Last Modified: 02/06/2024
License: MIT

NOTE: container I/O for the .shp/.shx/.dbf file triple. The .shx index
drives record access on the read side; attribute rows pass through as
raw fixed-length byte strings.
*/
pub mod attributes;
pub mod decode;
pub mod encode;
pub mod geometry;
pub mod rings;

use crate::shapefile::attributes::{
    dialect_name, fields_are_supported, AttributeField, AttributeHeader,
};
use crate::shapefile::geometry::ShapeType;
use byteorder::{ByteOrder, LittleEndian as LE};
use chrono::Datelike;
use shpclean_common::structures::BoundingBox;
use shpclean_common::utils::{ByteOrderReader, ByteOrderWriter, Endianness};
use std::fs::File;
use std::io::{BufWriter, Error, ErrorKind, Seek, SeekFrom, Write};

const FILE_MAGIC: i32 = 9994;
const FILE_VERSION: i32 = 1000;
const HEADER_BYTES: usize = 100;
const INDEX_ENTRY_BYTES: usize = 8;

/// The main-header values shared by the .shp and .shx files. The .shx
/// copy of the extent is the authoritative one.
#[derive(Clone, Debug)]
pub struct ShapefileHeader {
    pub shape_type: ShapeType,
    pub extent: BoundingBox,
}

/// Outcome of fetching one record slot.
#[derive(Clone, Debug, PartialEq)]
pub enum RecordRead {
    /// A live record; `len` bytes of geometry payload are in
    /// `record_data()`, with the record's embedded bounding box (absent
    /// for null shapes and for payloads no box can be taken from).
    Entity {
        len: usize,
        bbox: Option<BoundingBox>,
    },
    /// The attribute row carries the dBASE logical-deletion flag.
    Deleted,
    /// Past the last .shx entry.
    Eof,
}

struct ReadStreams {
    shp: ByteOrderReader<File>,
    shx: ByteOrderReader<File>,
    dbf: ByteOrderReader<File>,
}

struct WriteStreams {
    shp: ByteOrderWriter<BufWriter<File>>,
    shx: ByteOrderWriter<BufWriter<File>>,
    dbf: ByteOrderWriter<BufWriter<File>>,
    // running sizes in 16-bit words, headers included
    shp_words: i32,
    shx_words: i32,
    recno: i32,
    extent: BoundingBox,
}

enum Mode {
    Read(ReadStreams),
    Write(WriteStreams),
}

/// An open shapefile triple, either readable or writable.
pub struct Shapefile {
    pub stem: String,
    pub header: ShapefileHeader,
    pub attr_header: AttributeHeader,
    pub fields: Vec<AttributeField>,
    /// Set when the .shp and .shx headers disagree on the extent; the
    /// file stays readable.
    pub bbox_mismatch: bool,
    pub num_records: u32,
    mode: Mode,
    geom_buf: Vec<u8>,
    attr_buf: Vec<u8>,
}

impl Shapefile {
    /// Opens `stem.shx`, `stem.shp` and `stem.dbf` for reading and
    /// parses all three headers.
    pub fn open_read(stem: &str) -> Result<Shapefile, Error> {
        let mut shx = open_reader(&format!("{}.shx", stem))?;
        let mut shp = open_reader(&format!("{}.shp", stem))?;
        let mut dbf = open_reader(&format!("{}.dbf", stem))?;

        let (_, shx_extent) = read_main_header(&mut shx, stem)?;
        let (shp_shape, shp_extent) = read_main_header(&mut shp, stem)?;
        let shape_type = match ShapeType::from_int(shp_shape) {
            Some(st) => st,
            None => {
                return Err(Error::new(
                    ErrorKind::InvalidData,
                    format!("'{}' shape={} is not supported", stem, shp_shape),
                ));
            }
        };
        let bbox_mismatch = shx_extent.min_x != shp_extent.min_x
            || shx_extent.min_y != shp_extent.min_y
            || shx_extent.max_x != shp_extent.max_x
            || shx_extent.max_y != shp_extent.max_y;
        let num_records = ((shx.len() - HEADER_BYTES) / INDEX_ENTRY_BYTES) as u32;

        let (attr_header, fields) = read_attribute_header(&mut dbf, stem)?;

        Ok(Shapefile {
            stem: stem.to_string(),
            header: ShapefileHeader {
                shape_type,
                extent: shx_extent,
            },
            attr_header,
            fields,
            bbox_mismatch,
            num_records,
            mode: Mode::Read(ReadStreams { shp, shx, dbf }),
            geom_buf: Vec::new(),
            attr_buf: Vec::new(),
        })
    }

    /// Creates `stem.shp`, `stem.shx` and `stem.dbf` for writing, with
    /// placeholder main headers and the full .dbf descriptor table.
    /// `flush_headers` must run after the last record.
    pub fn open_write(
        stem: &str,
        shape_type: ShapeType,
        fields: &[AttributeField],
    ) -> Result<Shapefile, Error> {
        let mut shp = open_writer(&format!("{}.shp", stem))?;
        let mut shx = open_writer(&format!("{}.shx", stem))?;
        let mut dbf = open_writer(&format!("{}.dbf", stem))?;

        shp.write_bytes(&[0u8; HEADER_BYTES])?;
        shx.write_bytes(&[0u8; HEADER_BYTES])?;

        dbf.write_bytes(&[0u8; 32])?;
        let mut record_length = 1u16; // deletion flag
        for field in fields {
            let mut name = [0u8; 11];
            for (i, b) in field.name.bytes().take(11).enumerate() {
                name[i] = b;
            }
            dbf.write_bytes(&name)?;
            dbf.write_u8(field.field_type as u8)?;
            dbf.write_bytes(&[0u8; 4])?;
            dbf.write_u8(field.field_length)?;
            dbf.write_u8(field.decimal_count)?;
            dbf.write_bytes(&[0u8; 14])?;
            record_length += field.field_length as u16;
        }
        dbf.write_u8(0x0D)?;
        let header_size = (32 + 32 * fields.len() + 1) as u16;

        Ok(Shapefile {
            stem: stem.to_string(),
            header: ShapefileHeader {
                shape_type,
                extent: BoundingBox::default(),
            },
            attr_header: AttributeHeader {
                num_records: 0,
                header_size,
                record_length,
            },
            fields: fields.to_vec(),
            bbox_mismatch: false,
            num_records: 0,
            mode: Mode::Write(WriteStreams {
                shp,
                shx,
                dbf,
                shp_words: (HEADER_BYTES / 2) as i32,
                shx_words: (HEADER_BYTES / 2) as i32,
                recno: 0,
                extent: BoundingBox::default(),
            }),
            geom_buf: Vec::new(),
            attr_buf: Vec::new(),
        })
    }

    /// Raw geometry payload of the record fetched last.
    pub fn record_data(&self) -> &[u8] {
        &self.geom_buf
    }

    /// Raw attribute row of the record fetched last.
    pub fn attr_data(&self) -> &[u8] {
        &self.attr_buf
    }

    /// Fetches record slot `row`: the .shx entry locates the geometry,
    /// the .dbf row is read alongside it.
    pub fn read_record(&mut self, row: u32) -> Result<RecordRead, Error> {
        let stem = self.stem.clone();
        let streams = match &mut self.mode {
            Mode::Read(s) => s,
            Mode::Write(_) => {
                return Err(Error::new(
                    ErrorKind::InvalidInput,
                    "shapefile is not open for reading",
                ));
            }
        };

        let entry_pos = HEADER_BYTES + INDEX_ENTRY_BYTES * row as usize;
        if entry_pos + INDEX_ENTRY_BYTES > streams.shx.len() {
            return Ok(RecordRead::Eof);
        }
        streams.shx.set_byte_order(Endianness::BigEndian);
        streams.shx.seek(entry_pos)?;
        let offset = streams.shx.read_i32()?;
        // the index only locates the record; the sub-header sizes it
        let _shx_words = streams.shx.read_i32()?;
        if offset < 0 {
            return Err(corrupt_file(&stem));
        }

        let attr_pos =
            self.attr_header.header_size as usize + row as usize * self.attr_header.record_length as usize;
        let record_length = self.attr_header.record_length as usize;
        if attr_pos + record_length > streams.dbf.len() {
            return Err(corrupt_file(&stem));
        }
        self.attr_buf.resize(record_length, 0u8);
        streams.dbf.seek(attr_pos)?;
        streams.dbf.read_exact(&mut self.attr_buf)?;
        if self.attr_buf[0] == b'*' {
            return Ok(RecordRead::Deleted);
        }

        let record_pos = 2 * offset as usize;
        if record_pos + INDEX_ENTRY_BYTES > streams.shp.len() {
            return Err(corrupt_file(&stem));
        }
        streams.shp.set_byte_order(Endianness::BigEndian);
        streams.shp.seek(record_pos)?;
        let _recno = streams.shp.read_i32()?;
        let content_words = streams.shp.read_i32()?;
        if content_words < 0 {
            return Err(corrupt_file(&stem));
        }
        let len = 2 * content_words as usize;
        if record_pos + INDEX_ENTRY_BYTES + len > streams.shp.len() {
            return Err(corrupt_file(&stem));
        }
        self.geom_buf.resize(len, 0u8);
        streams.shp.read_exact(&mut self.geom_buf)?;

        Ok(RecordRead::Entity {
            len,
            bbox: embedded_bbox(&self.geom_buf),
        })
    }

    /// Appends one record: the geometry payload goes to .shp with its
    /// big-endian sub-header, the matching entry to .shx, the raw
    /// attribute row to .dbf. The running extent grows by the record's
    /// embedded bounding box.
    pub fn write_record(&mut self, geom: &[u8], attr: &[u8]) -> Result<(), Error> {
        let streams = match &mut self.mode {
            Mode::Write(s) => s,
            Mode::Read(_) => {
                return Err(Error::new(
                    ErrorKind::InvalidInput,
                    "shapefile is not open for writing",
                ));
            }
        };
        let bbox = embedded_bbox(geom);

        let content_words = (geom.len() / 2) as i32;
        streams.shx.write_i32(streams.shp_words)?;
        streams.shx.write_i32(content_words)?;
        streams.shx_words += (INDEX_ENTRY_BYTES / 2) as i32;

        streams.shp.write_i32(streams.recno + 1)?;
        streams.shp.write_i32(content_words)?;
        streams.shp.write_bytes(geom)?;
        streams.shp_words += (INDEX_ENTRY_BYTES / 2) as i32 + content_words;

        streams.dbf.write_bytes(attr)?;

        if let Some(bb) = bbox {
            streams.extent.expand_by(&bb);
        }
        streams.recno += 1;
        self.num_records = streams.recno as u32;
        Ok(())
    }

    /// Finalizes a written triple: patches both main headers with the
    /// real file sizes and extent, and completes the .dbf header with
    /// today's date and the record count.
    pub fn flush_headers(&mut self) -> Result<(), Error> {
        let shape_type = self.header.shape_type;
        let attr_header = self.attr_header.clone();
        let streams = match &mut self.mode {
            Mode::Write(s) => s,
            Mode::Read(_) => {
                return Err(Error::new(
                    ErrorKind::InvalidInput,
                    "shapefile is not open for writing",
                ));
            }
        };

        write_main_header(&mut streams.shp, streams.shp_words, shape_type, &streams.extent)?;
        write_main_header(&mut streams.shx, streams.shx_words, shape_type, &streams.extent)?;

        streams.dbf.write_u8(0x1A)?;
        let inner = streams.dbf.get_inner();
        inner.flush()?;
        inner.seek(SeekFrom::Start(0))?;
        streams.dbf.set_byte_order(Endianness::LittleEndian);
        streams.dbf.write_u8(0x03)?;
        let today = chrono::Local::now().date_naive();
        streams.dbf.write_u8((today.year() - 1900) as u8)?;
        streams.dbf.write_u8(today.month() as u8)?;
        streams.dbf.write_u8(today.day() as u8)?;
        streams.dbf.write_u32(streams.recno as u32)?;
        streams.dbf.write_u16(attr_header.header_size)?;
        streams.dbf.write_u16(attr_header.record_length)?;
        streams.dbf.get_inner().flush()?;

        self.header.extent = streams.extent;
        self.attr_header.num_records = streams.recno as u32;
        Ok(())
    }
}

fn corrupt_file(stem: &str) -> Error {
    Error::new(
        ErrorKind::InvalidData,
        format!("'{}' is corrupted / has invalid format", stem),
    )
}

fn open_reader(path: &str) -> Result<ByteOrderReader<File>, Error> {
    let file = File::open(path).map_err(|e| {
        Error::new(
            e.kind(),
            format!("unable to open '{}' for reading: {}", path, e),
        )
    })?;
    ByteOrderReader::new(file, Endianness::BigEndian)
}

fn open_writer(path: &str) -> Result<ByteOrderWriter<BufWriter<File>>, Error> {
    let file = File::create(path).map_err(|e| {
        Error::new(
            e.kind(),
            format!("unable to open '{}' for writing: {}", path, e),
        )
    })?;
    Ok(ByteOrderWriter::new(
        BufWriter::new(file),
        Endianness::BigEndian,
    ))
}

/// Reads the 100-byte main header shared by .shp and .shx: big-endian
/// magic, little-endian shape type at 32 and extent at 36.
fn read_main_header(
    reader: &mut ByteOrderReader<File>,
    stem: &str,
) -> Result<(i32, BoundingBox), Error> {
    if reader.len() < HEADER_BYTES {
        return Err(corrupt_file(stem));
    }
    reader.set_byte_order(Endianness::BigEndian);
    reader.seek(0)?;
    if reader.read_i32()? != FILE_MAGIC {
        return Err(corrupt_file(stem));
    }
    reader.set_byte_order(Endianness::LittleEndian);
    reader.seek(32)?;
    let shape = reader.read_i32()?;
    let extent = BoundingBox::new(
        reader.read_f64()?,
        reader.read_f64()?,
        reader.read_f64()?,
        reader.read_f64()?,
    );
    Ok((shape, extent))
}

fn write_main_header(
    writer: &mut ByteOrderWriter<BufWriter<File>>,
    size_words: i32,
    shape_type: ShapeType,
    extent: &BoundingBox,
) -> Result<(), Error> {
    let inner = writer.get_inner();
    inner.flush()?;
    inner.seek(SeekFrom::Start(0))?;
    writer.set_byte_order(Endianness::BigEndian);
    writer.write_i32(FILE_MAGIC)?;
    writer.write_bytes(&[0u8; 20])?;
    writer.write_i32(size_words)?;
    writer.set_byte_order(Endianness::LittleEndian);
    writer.write_i32(FILE_VERSION)?;
    writer.write_i32(shape_type.to_int())?;
    if extent.is_empty() {
        writer.write_bytes(&[0u8; 32])?;
    } else {
        writer.write_f64(extent.min_x)?;
        writer.write_f64(extent.min_y)?;
        writer.write_f64(extent.max_x)?;
        writer.write_f64(extent.max_y)?;
    }
    // z and m ranges stay zero
    writer.write_bytes(&[0u8; 32])?;
    writer.get_inner().flush()?;
    Ok(())
}

/// Parses the attribute-file header and descriptor table. Memo fields
/// are dropped from the list (their byte span is kept in the row
/// layout); the surviving fields must all carry supported types.
fn read_attribute_header(
    dbf: &mut ByteOrderReader<File>,
    stem: &str,
) -> Result<(AttributeHeader, Vec<AttributeField>), Error> {
    if dbf.len() < 32 {
        return Err(corrupt_file(stem));
    }
    dbf.set_byte_order(Endianness::LittleEndian);
    dbf.seek(0)?;
    let magic = dbf.read_u8()?;
    if let Some(dialect) = dialect_name(magic) {
        return Err(Error::new(
            ErrorKind::InvalidData,
            format!(
                "'{}'\ninvalid magic number {:02x} [{} format]",
                stem, magic, dialect
            ),
        ));
    }
    dbf.seek(4)?;
    let num_records = dbf.read_u32()?;
    let header_size = dbf.read_u16()?;
    let record_length = dbf.read_u16()?;
    if (header_size as usize) > dbf.len() || header_size < 32 {
        return Err(corrupt_file(stem));
    }

    let mut fields = Vec::new();
    let mut offset = 1u32; // the deletion flag leads every row
    for ind in (32..(header_size as usize - 1)).step_by(32) {
        dbf.seek(ind)?;
        let mut name_bytes = [0u8; 11];
        dbf.read_exact(&mut name_bytes)?;
        let name_len = name_bytes.iter().position(|&b| b == 0).unwrap_or(11);
        let name = String::from_utf8_lossy(&name_bytes[..name_len]).to_string();
        let field_type = dbf.read_u8()? as char;
        dbf.seek(ind + 16)?;
        let field_length = dbf.read_u8()?;
        let decimal_count = dbf.read_u8()?;
        if field_type == 'M' {
            eprintln!(
                "WARNING: column \"{}\" is of the MEMO type and will be ignored",
                name
            );
        } else {
            fields.push(AttributeField::new(
                &name,
                field_type,
                offset,
                field_length,
                decimal_count,
            ));
        }
        offset += field_length as u32;
    }
    if !fields_are_supported(&fields) {
        return Err(Error::new(
            ErrorKind::InvalidData,
            format!("'{}.dbf' contains unsupported data types", stem),
        ));
    }
    Ok((
        AttributeHeader {
            num_records,
            header_size,
            record_length,
        },
        fields,
    ))
}

/// Extracts the record's embedded bounding box from its raw payload.
/// Null shapes have none; point shapes collapse to a degenerate box.
/// Unknown tags and truncated payloads also yield `None`; the decoder
/// is the one that reports those, record by record.
fn embedded_bbox(buf: &[u8]) -> Option<BoundingBox> {
    if buf.len() < 4 {
        return None;
    }
    let tag = LE::read_i32(&buf[0..4]);
    match ShapeType::from_int(tag)? {
        ShapeType::Null => None,
        ShapeType::Point | ShapeType::PointZ | ShapeType::PointM => {
            if buf.len() < 20 {
                return None;
            }
            let x = LE::read_f64(&buf[4..12]);
            let y = LE::read_f64(&buf[12..20]);
            Some(BoundingBox::new(x, y, x, y))
        }
        _ => {
            if buf.len() < 36 {
                return None;
            }
            Some(BoundingBox::new(
                LE::read_f64(&buf[4..12]),
                LE::read_f64(&buf[12..20]),
                LE::read_f64(&buf[20..28]),
                LE::read_f64(&buf[28..36]),
            ))
        }
    }
}
