//! Position-tracking instruction cursor over raw script bytes.

use bitcoin::{
    Script,
    script::{Instruction, Instructions},
};
use tracing::trace;

/// Sequential reader yielding one script instruction per step.
///
/// Every push encoding is handled (`OP_0`, direct pushes of 1 to 75 bytes and
/// `OP_PUSHDATA1/2/4`), as are opcodes without data such as the small integer
/// pushes.  A push whose length prefix claims more bytes than remain ends the
/// stream: the reader reports `None` from then on and [`offset`] sits at the
/// end of the buffer.
///
/// [`offset`]: InstructionReader::offset
#[derive(Debug, Clone)]
pub struct InstructionReader<'a> {
    buf: &'a [u8],
    instructions: Instructions<'a>,
}

impl<'a> InstructionReader<'a> {
    /// Creates a reader starting at the beginning of `buf`.
    pub fn new(buf: &'a [u8]) -> Self {
        Self::at(buf, 0)
    }

    /// Creates a reader starting at byte offset `pos` of `buf`.
    ///
    /// Offsets past the end produce an exhausted reader.
    pub fn at(buf: &'a [u8], pos: usize) -> Self {
        let start = pos.min(buf.len());
        Self {
            buf,
            instructions: Script::from_bytes(&buf[start..]).instructions(),
        }
    }

    /// Byte offset of the next instruction within the buffer.
    pub fn offset(&self) -> usize {
        self.buf.len() - self.instructions.as_script().len()
    }

    /// Bytes from the current position to the end of the buffer.
    pub fn remaining(&self) -> &'a [u8] {
        self.instructions.as_script().as_bytes()
    }

    /// The whole buffer this reader walks over.
    pub fn buf(&self) -> &'a [u8] {
        self.buf
    }

    /// Reads the next instruction, or `None` once the stream is exhausted.
    pub fn next_instruction(&mut self) -> Option<Instruction<'a>> {
        let pos = self.offset();
        match self.instructions.next()? {
            Ok(instruction) => Some(instruction),
            Err(err) => {
                trace!(%err, %pos, "script ends inside an instruction");
                None
            }
        }
    }
}

impl<'a> Iterator for InstructionReader<'a> {
    /// Start offset of the instruction and the instruction itself.
    type Item = (usize, Instruction<'a>);

    fn next(&mut self) -> Option<Self::Item> {
        let pos = self.offset();
        self.next_instruction().map(|ins| (pos, ins))
    }
}
