use bitflags::bitflags;

#[cfg(feature = "import")]
use byteorder::{
	BE,
	LE,
	ReadBytesExt
};

use json::JsonValue;

use glbkit_core::tag4;

#[cfg(feature = "import")]
use glbkit_core::io_ext::ReadBinExt;

#[cfg(feature = "import")]
use self::import::GLBImportError;

pub const MAGIC: u32 = tag4!(b"glTF");
pub const VERSION: u32 = 2;

/// Size of the fixed container header in bytes
pub const HEADER_SIZE: u32 = 12;

/// Fixed header at the start of every binary glTF container
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Header {
	pub magic: u32,
	pub version: u32,
	/// Declared length of the whole container, header included
	pub size: u32,
}

impl Header {
	/// Reads the container header and checks the declared length against
	/// the actual buffer length. The magic and version fields are read
	/// but not validated here, see [`ImportFlag::STRICT_TAGS`].
	#[cfg(feature = "import")]
	pub fn read(data: &[u8]) -> Result<Header, GLBImportError> {
		let mut buf = data;

		let magic = buf.read_u32::<BE>()?;
		let version = buf.read_u32::<LE>()?;
		let size = buf.read_u32::<LE>()?;

		if size as usize != data.len() {
			return Err(GLBImportError::Length {
				declared: size,
				actual: data.len(),
			});
		}

		Ok(Header {
			magic: magic,
			version: version,
			size: size,
		})
	}
}

#[derive(Clone, Copy, Debug, PartialEq)]
#[repr(u32)]
pub enum ChunkType {
	Binary = tag4!(b"BIN "),
	Json = tag4!(b"JSON"),
	Unknown,
}

impl ChunkType {
	/// Maps a raw chunk type tag to a recognized kind
	pub fn from_tag(tag: u32) -> ChunkType {
		match tag {
			t if t == ChunkType::Binary as u32 => ChunkType::Binary,
			t if t == ChunkType::Json as u32 => ChunkType::Json,
			_ => ChunkType::Unknown,
		}
	}
}

#[derive(Clone, Debug, PartialEq)]
pub struct Chunk {
	pub size: u32,
	pub tag: u32,
	pub data: Vec<u8>,
}

impl Chunk {
	#[cfg(feature = "import")]
	fn read<R>(buf: &mut R) -> Result<Chunk, GLBImportError>
	where
		R: ReadBytesExt + ReadBinExt,
	{
		let size = buf.read_u32::<LE>()?;
		let tag = buf.read_u32::<BE>()?; // 'JSON' or 'BIN '

		Ok(Chunk {
			size: size,
			tag: tag,
			data: buf.read_bytes(size as usize)?,
		})
	}

	pub fn kind(&self) -> ChunkType {
		ChunkType::from_tag(self.tag)
	}
}

bitflags! {
	pub struct ImportFlag: u32 {
		/// Fail on a magic or chunk type tag that does not match its
		/// expected value, instead of consuming the data regardless
		const STRICT_TAGS = 1;
		/// Point the first buffer of the decoded document at an external
		/// file instead of the embedded binary chunk
		const REWRITE_BUFFER0_URI = 2;
	}
}

impl Default for ImportFlag {
	fn default() -> Self {
		ImportFlag::REWRITE_BUFFER0_URI
	}
}

#[derive(Clone, Debug, PartialEq)]
pub struct ImportCfg {
	pub flags: ImportFlag,
	/// Replacement uri for the document's first buffer
	pub buffer0_uri: String,
}

impl Default for ImportCfg {
	fn default() -> Self {
		ImportCfg {
			flags: ImportFlag::default(),
			buffer0_uri: "0.bin".to_string(),
		}
	}
}

/// The two payloads of a decoded container
#[derive(Clone, Debug, PartialEq)]
pub struct GLBContainer {
	pub header: Header,
	pub json: JsonValue,
	/// `None` when the container ends after the JSON chunk
	pub binary: Option<Vec<u8>>,
}

impl GLBContainer {
	/// Splits a container into its glTF document and binary buffer
	#[cfg(feature = "import")]
	pub fn read(data: &[u8], cfg: &ImportCfg) -> Result<GLBContainer, GLBImportError> {
		let header = Header::read(data)?;
		if cfg.flags.contains(ImportFlag::STRICT_TAGS) && header.magic != MAGIC {
			return Err(GLBImportError::Magic(header.magic));
		}

		let mut buf = &data[(HEADER_SIZE as usize)..];

		let chunk0 = Chunk::read(&mut buf)?;
		if cfg.flags.contains(ImportFlag::STRICT_TAGS) && chunk0.kind() != ChunkType::Json {
			return Err(GLBImportError::ChunkType {
				expected: ChunkType::Json,
				found: chunk0.tag,
			});
		}

		let mut root = json::parse(&String::from_utf8(chunk0.data)?)?;

		if cfg.flags.contains(ImportFlag::REWRITE_BUFFER0_URI) {
			if !root["buffers"][0].is_object() {
				return Err(GLBImportError::Buffers);
			}

			root["buffers"][0]["uri"] = cfg.buffer0_uri.as_str().into();
		}

		let binary = if buf.is_empty() {
			None
		} else {
			let chunk1 = Chunk::read(&mut buf)?;
			if cfg.flags.contains(ImportFlag::STRICT_TAGS) && chunk1.kind() != ChunkType::Binary {
				return Err(GLBImportError::ChunkType {
					expected: ChunkType::Binary,
					found: chunk1.tag,
				});
			}

			Some(chunk1.data)
		};

		Ok(GLBContainer {
			header: header,
			json: root,
			binary: binary,
		})
	}
}

#[cfg(feature = "import")]
pub mod import {
	use std::{
		io,
		string::FromUtf8Error
	};

	use thiserror::Error;

	use super::ChunkType;

	#[derive(Debug, Error)]
	pub enum GLBImportError {
		#[error("JSON chunk has no buffers[0] object to rewrite")]
		Buffers,
		#[error("Expected a {expected:?} chunk, found type tag {found:#010X}")]
		ChunkType {
			expected: ChunkType,
			found: u32,
		},
		#[error("I/O error")]
		IO {
			source: io::Error,
		},
		#[error("JSON parsing error")]
		Json {
			#[from]
			source: json::Error,
		},
		#[error("Declared container length {declared} does not match buffer length {actual}")]
		Length {
			declared: u32,
			actual: usize,
		},
		#[error("Not a glTF binary container: {0:#010X}")]
		Magic(u32),
		#[error("Container ends before the end of a declared read")]
		Underrun,
		#[error("JSON chunk is not valid UTF-8")]
		Utf8 {
			#[from]
			source: FromUtf8Error,
		},
	}

	// Reads run over an in-memory slice, so a short read can only mean
	// the container itself is truncated.
	impl From<io::Error> for GLBImportError {
		fn from(err: io::Error) -> GLBImportError {
			match err.kind() {
				io::ErrorKind::UnexpectedEof => GLBImportError::Underrun,
				_ => GLBImportError::IO { source: err },
			}
		}
	}

}
