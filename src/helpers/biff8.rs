//! Record reader for the BIFF8 workbook stream of `.xls` files.
//! CONTINUE records are stitched into the record they extend.

use crate::error::ImportError;
use crate::helpers::string::to_f64;
use crate::helpers::string::to_u16;
use crate::helpers::string::to_u32;
use crate::helpers::string::to_u64;
use crate::helpers::string::to_usize;
use encoding_rs::Encoding;
use encoding_rs::UTF_16LE;
use thiserror::Error;

const CONTINUE: u16 = 60;

#[derive(Error, Debug)]
pub enum Biff8Error {
    #[error("Record ended before {needed} more bytes could be read")]
    UnexpectedEnd { needed: usize },

    #[error("Record at offset {offset} is truncated")]
    TruncatedRecord { offset: usize },
}

/// Reader for BIFF8 records with their continuation chunks.
pub(crate) struct Biff8Reader {
    /// Code page of compressed strings, set by the CODEPAGE record
    pub(crate) encoding: &'static Encoding,
    buffer: Vec<u8>,
    pointer: usize,
    chunks: Vec<(usize, usize)>,
    index: usize,
    offset: usize,
}

impl Biff8Reader {
    pub(crate) fn new(data: Vec<u8>) -> Biff8Reader {
        Biff8Reader {
            encoding: UTF_16LE,
            buffer: data,
            pointer: 0,
            chunks: Vec::new(),
            index: 0,
            offset: 0,
        }
    }

    /// Advances to the next record and returns its type, `None` at the end of the stream.
    pub(crate) fn next(&mut self) -> Result<Option<u16>, ImportError> {
        if self.pointer + 4 <= self.buffer.len() {
            self.index = 0;
            self.offset = 0;

            let kind = self.get_u16_at(self.pointer)?;
            let (lower, upper) = self.chunk_at(self.pointer)?;
            self.pointer = upper;

            self.chunks.clear();
            self.chunks.push((lower, upper));
            while self.pointer + 4 <= self.buffer.len() && self.get_u16_at(self.pointer)? == CONTINUE {
                let (lower, upper) = self.chunk_at(self.pointer)?;
                self.pointer = upper;
                self.chunks.push((lower, upper));
            }

            Ok(Some(kind))
        } else {
            Ok(None)
        }
    }

    /// Byte range of the record body starting at `pointer`.
    fn chunk_at(&self, pointer: usize) -> Result<(usize, usize), ImportError> {
        let size = self.get_u16_at(pointer + 2)? as usize;
        let lower = pointer + 4;
        let upper = lower + size;
        if upper > self.buffer.len() {
            Err(Biff8Error::TruncatedRecord { offset: pointer })?
        }
        Ok((lower, upper))
    }

    /// Moves to an absolute stream offset, such as a sheet's BOF position.
    pub(crate) fn goto(&mut self, pointer: usize) {
        self.pointer = pointer;
        self.chunks.clear();
    }

    /// Reads exactly `length` bytes of the current record.
    fn read_exact(&mut self, length: usize) -> Result<&[u8], ImportError> {
        let (data, size) = self.read(length);
        if size == length {
            Ok(data)
        } else {
            Err(Biff8Error::UnexpectedEnd { needed: length })?
        }
    }

    /// Reads up to `length` bytes without crossing a chunk boundary.
    fn read(&mut self, length: usize) -> (&[u8], usize) {
        if let Some((lower, upper)) = self.chunks.get(self.index) {
            let source = (*upper).min(*lower + self.offset);
            let target = (*upper).min(source + length);
            let size = target - source;
            if source < *upper {
                if target == *upper {
                    self.index += 1;
                    self.offset = 0;
                } else {
                    self.offset += size;
                }
                return (&self.buffer[source..target], size);
            }
        }
        (&[], 0)
    }

    pub(crate) fn skip(&mut self, length: usize) -> Result<(), ImportError> {
        let mut remaining = length;
        while remaining > 0 {
            let (_, size) = self.read(remaining);
            if size == 0 {
                Err(Biff8Error::UnexpectedEnd { needed: length })?
            }
            remaining -= size;
        }
        Ok(())
    }

    pub(crate) fn read_u8(&mut self) -> Result<u8, ImportError> {
        self.read_exact(1).map(|data| data[0])
    }

    pub(crate) fn read_u16(&mut self) -> Result<u16, ImportError> {
        self.read_exact(2).map(to_u16)
    }

    /// Gets the 16-bit value `offset` bytes before the end of the current record.
    pub(crate) fn get_u16_back(&self, offset: usize) -> Result<u16, ImportError> {
        let mut offset = offset;
        for (lower, upper) in self.chunks.iter().rev() {
            if *lower + offset <= *upper {
                return self.get_u16_at(*upper - offset);
            } else {
                offset -= *upper - *lower;
            }
        }
        Err(Biff8Error::UnexpectedEnd { needed: 2 })?
    }

    fn get_u16_at(&self, index: usize) -> Result<u16, ImportError> {
        if index + 2 <= self.buffer.len() {
            Ok(to_u16(&self.buffer[index..index + 2]))
        } else {
            Err(Biff8Error::UnexpectedEnd { needed: 2 })?
        }
    }

    pub(crate) fn read_u32(&mut self) -> Result<u32, ImportError> {
        self.read_exact(4).map(to_u32)
    }

    pub(crate) fn read_usize(&mut self) -> Result<usize, ImportError> {
        self.read_exact(4).map(to_usize)
    }

    pub(crate) fn read_u64(&mut self) -> Result<u64, ImportError> {
        self.read_exact(8).map(to_u64)
    }

    pub(crate) fn read_f64(&mut self) -> Result<f64, ImportError> {
        self.read_exact(8).map(to_f64)
    }

    /// Reads an RK number: a 30-bit integer or the high bits of a double, optionally divided by 100.
    pub(crate) fn read_rk_number(&mut self) -> Result<f64, ImportError> {
        let value = self.read_u32()?;
        Ok(decode_rk_number(value))
    }

    /// Reads a ShortXLUnicodeString (1-byte length prefix)
    pub(crate) fn read_short_xl_unicode_string(&mut self) -> Result<String, ImportError> {
        let mut string = String::new();
        let chars = self.read_u8()? as usize;
        self.read_string_into(chars, false, &mut string)?;
        Ok(string)
    }

    /// Reads an XLUnicodeString (2-byte length prefix)
    pub(crate) fn read_xl_unicode_string(&mut self) -> Result<String, ImportError> {
        let mut string = String::new();
        let chars = self.read_u16()? as usize;
        self.read_string_into(chars, false, &mut string)?;
        Ok(string)
    }

    /// Reads an XLUnicodeRichExtendedString, which may span CONTINUE records.
    pub(crate) fn read_xl_unicode_rich_extended_string(&mut self) -> Result<String, ImportError> {
        let mut string = String::new();
        let mut expected = self.read_u16()? as usize;
        let (mut actual, trailing) = self.read_string_into(expected, true, &mut string)?;
        while actual < expected {
            expected -= actual;
            (actual, _) = self.read_string_into(expected, false, &mut string)?;
            if actual == 0 {
                Err(Biff8Error::UnexpectedEnd { needed: expected })?
            }
        }
        // rgRun and ExtRst follow the last character
        self.skip(trailing)?;
        Ok(string)
    }

    /// Appends up to `chars` characters of the current chunk to `content`.
    /// Returns the number of characters read and the size of the formatting runs that follow them.
    fn read_string_into(&mut self, chars: usize, is_extend: bool, content: &mut String) -> Result<(usize, usize), ImportError> {
        let encoding = self.encoding;
        let flag = self.read_u8()?;
        let is_high_byte = (flag & 0x1) > 0;
        let expected = chars_to_bytes(is_high_byte, chars);
        let rich_string_count = if is_extend && (flag & 0x8) > 0 {
            self.read_u16()? as usize
        } else {
            0
        };
        let phonetic_size = if is_extend && (flag & 0x4) > 0 {
            self.read_usize()?
        } else {
            0
        };
        let (bytes, actual) = self.read(expected);
        if is_high_byte {
            content.push_str(&UTF_16LE.decode_without_bom_handling(bytes).0);
        } else if encoding == UTF_16LE {
            // UTF-16 code units with their zero high byte dropped
            content.extend(bytes.iter().map(|byte| char::from(*byte)));
        } else {
            content.push_str(&encoding.decode_without_bom_handling(bytes).0);
        }
        Ok((bytes_to_chars(is_high_byte, actual), 4 * rich_string_count + phonetic_size))
    }
}

/// Decodes the 32-bit RK representation of a number.
pub(crate) fn decode_rk_number(value: u32) -> f64 {
    let is_percentage = (value & 0x01) != 0;
    let is_integer = (value & 0x02) != 0;

    let number = if is_integer {
        ((value as i32) >> 2) as f64
    } else {
        f64::from_bits(((value & 0xFFFF_FFFC) as u64) << 32)
    };
    if is_percentage {
        number / 100.0
    } else {
        number
    }
}

#[inline]
fn chars_to_bytes(is_high_byte: bool, chars: usize) -> usize {
    if is_high_byte { chars << 1 } else { chars }
}

#[inline]
fn bytes_to_chars(is_high_byte: bool, bytes: usize) -> usize {
    if is_high_byte { bytes >> 1 } else { bytes }
}

#[macro_export]
macro_rules! match_biff8_record {
    ($reader:expr => { $($arms:tt)* }) => {
        while let Some(kind) = $reader.next()? {
            match kind {
                $($arms)*
                _ => (),
            }
        }
    };
}
