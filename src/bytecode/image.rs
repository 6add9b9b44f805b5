use serde::{Deserialize, Serialize};
use thiserror::Error;

// Memory map, allocated downwards from the end of the image:
//
//   [0, CODE_SIZE)                        code
//   IP_HIGH_POS, IP_LOW_POS               instruction pointer cells
//   CALL_STACK_POINTER_POS                call stack depth cell
//   STACK_POINTER_POS                     data stack depth cell
//   [CALL_STACK_START, STACK_START)       call (return address) stack
//   [STACK_START, IMAGE_SIZE)             data stack

pub const IMAGE_SIZE: usize = 8192;
pub const STACK_SIZE: usize = 256;
pub const CALL_STACK_SIZE: usize = 32;

pub const STACK_START: usize = IMAGE_SIZE - STACK_SIZE;
pub const CALL_STACK_START: usize = STACK_START - CALL_STACK_SIZE;
pub const STACK_POINTER_POS: usize = CALL_STACK_START - 1;
pub const CALL_STACK_POINTER_POS: usize = STACK_POINTER_POS - 1;
pub const IP_LOW_POS: usize = CALL_STACK_POINTER_POS - 1;
pub const IP_HIGH_POS: usize = IP_LOW_POS - 1;

pub const CODE_SIZE: usize = IMAGE_SIZE - STACK_SIZE - CALL_STACK_SIZE - 4;

const _: () = assert!(CODE_SIZE == IP_HIGH_POS);

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("image must be {expected} bytes, got {0}", expected = IMAGE_SIZE)]
    WrongSize(usize),
    #[error("code length {0} overlaps the control block")]
    CodeOverflow(usize),
    #[error("malformed image: {0}")]
    Codec(#[from] postcard::Error),
}

/// A fixed-size bytecode image: code region followed by the control block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BytecodeImage {
    bytes: Vec<u8>,
    /// Number of code bytes the assembler emitted.
    code_len: u16,
}

impl Default for BytecodeImage {
    fn default() -> Self {
        Self::new()
    }
}

impl BytecodeImage {
    pub fn new() -> Self {
        BytecodeImage {
            bytes: vec![0; IMAGE_SIZE],
            code_len: 0,
        }
    }

    /// Build an image from raw code bytes, zero-filling the rest.
    pub fn from_code(code: &[u8]) -> Result<Self, ImageError> {
        if code.len() > CODE_SIZE {
            return Err(ImageError::CodeOverflow(code.len()));
        }
        let mut image = Self::new();
        image.bytes[..code.len()].copy_from_slice(code);
        image.code_len = code.len() as u16;
        Ok(image)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn code(&self) -> &[u8] {
        &self.bytes[..CODE_SIZE]
    }

    pub fn code_len(&self) -> u16 {
        self.code_len
    }

    pub(crate) fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn to_postcard(&self) -> Result<Vec<u8>, ImageError> {
        Ok(postcard::to_allocvec(self)?)
    }

    pub fn from_postcard(data: &[u8]) -> Result<Self, ImageError> {
        let image: BytecodeImage = postcard::from_bytes(data)?;
        if image.bytes.len() != IMAGE_SIZE {
            return Err(ImageError::WrongSize(image.bytes.len()));
        }
        if image.code_len as usize > CODE_SIZE {
            return Err(ImageError::CodeOverflow(image.code_len as usize));
        }
        Ok(image)
    }
}
