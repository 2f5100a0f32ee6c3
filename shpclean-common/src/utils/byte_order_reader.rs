/*
This code is part of the shpclean shapefile diagnose & repair tool.
Created: 11/03/2024
Last Modified: 27/05/2024
License: MIT
*/
use byteorder::{BigEndian, LittleEndian, ReadBytesExt};
use std::io::prelude::*;
use std::io::{Result, SeekFrom};

/// Thin cursor over a seekable stream that decodes scalars in a
/// selectable byte order. Shapefiles interleave big-endian record
/// framing with little-endian payloads, so the order can be switched
/// mid-stream with `set_byte_order`.
pub struct ByteOrderReader<R: Read + Seek> {
    is_le: bool,
    reader: R,
    pos: usize,
    len: usize,
}

impl<R: Read + Seek> ByteOrderReader<R> {
    pub fn new(mut reader: R, byte_order: Endianness) -> Result<ByteOrderReader<R>> {
        let len = reader.seek(SeekFrom::End(0))? as usize;
        reader.seek(SeekFrom::Start(0))?;
        Ok(ByteOrderReader {
            reader,
            is_le: byte_order == Endianness::LittleEndian,
            pos: 0usize,
            len,
        })
    }

    pub fn set_byte_order(&mut self, byte_order: Endianness) {
        self.is_le = byte_order == Endianness::LittleEndian;
    }

    pub fn seek(&mut self, position: usize) -> Result<()> {
        self.pos = position;
        self.reader.seek(SeekFrom::Start(self.pos as u64))?;
        Ok(())
    }

    pub fn pos(&self) -> usize {
        self.pos
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        self.pos += buf.len();
        self.reader.read_exact(buf)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        // no endian issues when reading single bytes
        self.pos += 1;
        self.reader.read_u8()
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        self.pos += 2;
        if self.is_le {
            return self.reader.read_u16::<LittleEndian>();
        }
        self.reader.read_u16::<BigEndian>()
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        self.pos += 4;
        if self.is_le {
            return self.reader.read_u32::<LittleEndian>();
        }
        self.reader.read_u32::<BigEndian>()
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        self.pos += 4;
        if self.is_le {
            return self.reader.read_i32::<LittleEndian>();
        }
        self.reader.read_i32::<BigEndian>()
    }

    pub fn read_f64(&mut self) -> Result<f64> {
        self.pos += 8;
        if self.is_le {
            return self.reader.read_f64::<LittleEndian>();
        }
        self.reader.read_f64::<BigEndian>()
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Endianness {
    LittleEndian,
    BigEndian,
}

impl Default for Endianness {
    fn default() -> Endianness {
        Endianness::LittleEndian
    }
}

#[cfg(test)]
mod test {
    use super::{ByteOrderReader, Endianness};
    use std::io::Cursor;

    #[test]
    fn test_mixed_byte_orders() {
        // 0x0000270A is 9994 big-endian, then 1.5f64 little-endian
        let mut bytes = vec![0x00u8, 0x00, 0x27, 0x0A];
        bytes.extend_from_slice(&1.5f64.to_le_bytes());
        let mut reader = Cursor::new(bytes);
        let mut bor = ByteOrderReader::new(&mut reader, Endianness::BigEndian).unwrap();
        assert_eq!(bor.read_i32().unwrap(), 9994);
        bor.set_byte_order(Endianness::LittleEndian);
        assert_eq!(bor.read_f64().unwrap(), 1.5);
        assert_eq!(bor.pos(), 12);
        assert_eq!(bor.len(), 12);
    }
}
