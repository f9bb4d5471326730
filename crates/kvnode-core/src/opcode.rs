//! Request opcodes. The framer (`kvnode_proto::framer`) only needs to know
//! which trailing fields to skip for each value; the handler is where an
//! opcode's byte actually means something.

/// A recognized request opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpCode {
    Get = 0x01,
    GetAll = 0x02,
    Put = 0x03,
    Delete = 0x04,
}

impl TryFrom<u8> for OpCode {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(OpCode::Get),
            0x02 => Ok(OpCode::GetAll),
            0x03 => Ok(OpCode::Put),
            0x04 => Ok(OpCode::Delete),
            other => Err(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_all_four_opcodes() {
        assert_eq!(OpCode::try_from(0x01), Ok(OpCode::Get));
        assert_eq!(OpCode::try_from(0x02), Ok(OpCode::GetAll));
        assert_eq!(OpCode::try_from(0x03), Ok(OpCode::Put));
        assert_eq!(OpCode::try_from(0x04), Ok(OpCode::Delete));
    }

    #[test]
    fn rejects_unknown_byte() {
        assert_eq!(OpCode::try_from(0xFF), Err(0xFF));
    }
}
