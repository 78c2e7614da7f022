//! Compiled program representation: a GC-rooted constants vector plus
//! function prototypes, and the serialized module format around them.

use thiserror::Error;

use super::encoder::{BytecodeReader, BytecodeWriter, DecodeError};
use super::opcode::Opcode;
use crate::gc::{GcRef, Heap, HeapObject, Root};
use crate::value::Value;

/// 8-byte module magic: `Somir&` followed by format version 0.1.
pub const MAGIC: [u8; 8] = *b"Somir&\x00\x01";

/// Raised when a jump displacement exceeds the signed 16-bit range.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("jump displacement out of 16-bit range")]
pub struct JumpOutOfRange;

/// Module decoding errors.
#[derive(Debug, Error)]
pub enum ChunkError {
    /// Truncated or malformed payload.
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),
    /// The input does not start with the Somir magic.
    #[error("not a Somir module (bad magic {0:02x?})")]
    InvalidMagic([u8; 8]),
    /// Unknown constant tag byte.
    #[error("invalid constant tag {0:#04x}")]
    InvalidConstantTag(u8),
    /// More constants than the format can index.
    #[error("constant table too large")]
    TooManyConstants,
}

/// Constant-entry tag bytes in the serialized form.
mod tags {
    pub const NIL: u8 = 0;
    pub const BOOL: u8 = 1;
    pub const INT: u8 = 2;
    pub const REAL: u8 = 3;
    pub const STR: u8 = 4;
}

/// One function's bytecode and metadata.
///
/// Argument values occupy slots `0..arity`; the first `LET` lands at
/// slot `arity`. `upvalues` lists, in upvalue order, the slot each
/// capture reads from in the immediately enclosing function.
#[derive(Debug, Default)]
pub struct FunctionProto {
    /// Declared number of arguments.
    pub arity: u16,
    /// Upvalue source slots in the enclosing function.
    pub upvalues: Vec<i16>,
    /// Bytecode; multi-byte operands are little-endian.
    pub code: Vec<u8>,
}

impl FunctionProto {
    /// Current write offset.
    pub fn position(&self) -> usize {
        self.code.len()
    }

    /// Append an opcode byte.
    pub fn emit_op(&mut self, op: Opcode) {
        self.code.push(op as u8);
    }

    /// Append an unsigned 16-bit operand.
    pub fn emit_u16(&mut self, value: u16) {
        self.code.extend_from_slice(&value.to_le_bytes());
    }

    /// Append a signed 16-bit operand.
    pub fn emit_i16(&mut self, value: i16) {
        self.code.extend_from_slice(&value.to_le_bytes());
    }

    /// Append `op` followed by a 16-bit jump placeholder; returns the
    /// placeholder offset for [`patch_jump`](Self::patch_jump).
    pub fn emit_jump(&mut self, op: Opcode) -> usize {
        self.emit_op(op);
        let at = self.position();
        self.emit_i16(0);
        at
    }

    /// Patch the placeholder at `at` to jump to the current position.
    ///
    /// Displacements are measured from the byte after the 16-bit
    /// operand: positive forward, negative backward.
    pub fn patch_jump(&mut self, at: usize) -> Result<(), JumpOutOfRange> {
        let displacement = self.position() as i64 - (at as i64 + 2);
        let displacement = i16::try_from(displacement).map_err(|_| JumpOutOfRange)?;
        self.code[at..at + 2].copy_from_slice(&displacement.to_le_bytes());
        Ok(())
    }

    /// Append `op` with a displacement back to `target`.
    pub fn emit_jump_back(&mut self, op: Opcode, target: usize) -> Result<(), JumpOutOfRange> {
        self.emit_op(op);
        let after_operand = self.position() as i64 + 2;
        let displacement =
            i16::try_from(target as i64 - after_operand).map_err(|_| JumpOutOfRange)?;
        self.emit_i16(displacement);
        Ok(())
    }
}

/// A compiled program.
///
/// The constants vector is a heap object, rooted for the chunk's
/// lifetime, so a collection at any safe point keeps every constant
/// (and every string it references) alive. Prototype 0 is the program's
/// top-level function.
pub struct Chunk {
    heap: Heap,
    constants: Root,
    /// Function prototypes; index 0 is the top level.
    pub functions: Vec<FunctionProto>,
}

impl Chunk {
    /// Maximum number of entries in the constants vector.
    pub const MAX_CONSTANTS: usize = u16::MAX as usize;

    /// Create an empty chunk whose constants vector is rooted on `heap`.
    pub fn new(heap: &Heap) -> Chunk {
        let constants = heap.alloc(HeapObject::Values(Vec::new()));
        Chunk {
            heap: heap.clone(),
            constants: heap.root(constants),
            functions: Vec::new(),
        }
    }

    /// The heap this chunk allocates constants on.
    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    /// The rooted constants object.
    pub fn constants_ref(&self) -> GcRef {
        self.constants.get()
    }

    /// The constants vector. It only ever grows.
    pub fn constants(&self) -> &[Value] {
        match self.constants.object() {
            HeapObject::Values(values) => values.as_slice(),
            _ => unreachable!("chunk constants are always a value vector"),
        }
    }

    fn constants_mut(&mut self) -> &mut Vec<Value> {
        // Sole mutable path into the rooted vector; the chunk owns it.
        match unsafe { self.constants.object_mut() } {
            HeapObject::Values(values) => values,
            _ => unreachable!("chunk constants are always a value vector"),
        }
    }

    /// Append a constant, returning its index, or `None` when the table
    /// is full.
    pub fn add_constant(&mut self, value: Value) -> Option<u16> {
        let values = self.constants_mut();
        if values.len() >= Chunk::MAX_CONSTANTS {
            return None;
        }
        values.push(value);
        Some((values.len() - 1) as u16)
    }

    /// Allocate `text` as a heap string and append it as a constant.
    pub fn add_string_constant(&mut self, text: &str) -> Option<u16> {
        let string = self.heap.alloc_str(text);
        self.add_constant(Value::Ref(string))
    }

    /// Serialize to the Somir module format: magic, constants, then
    /// functions, little-endian throughout.
    pub fn encode(&self) -> Vec<u8> {
        let mut writer = BytecodeWriter::new();
        writer.emit_bytes(&MAGIC);

        let constants = self.constants();
        writer.emit_u32(constants.len() as u32);
        for value in constants {
            match value {
                Value::Nil => writer.emit_u8(tags::NIL),
                Value::Bool(b) => {
                    writer.emit_u8(tags::BOOL);
                    writer.emit_u8(*b as u8);
                }
                Value::Int(i) => {
                    writer.emit_u8(tags::INT);
                    writer.emit_i32(*i);
                }
                Value::Real(x) => {
                    writer.emit_u8(tags::REAL);
                    writer.emit_f64(*x);
                }
                Value::Ref(obj) => match obj.object() {
                    HeapObject::Str(s) => {
                        writer.emit_u8(tags::STR);
                        writer.emit_string(s);
                    }
                    _ => unreachable!("only strings appear in serialized constants"),
                },
            }
        }

        writer.emit_u32(self.functions.len() as u32);
        for func in &self.functions {
            writer.emit_u16(func.arity);
            writer.emit_u16(func.upvalues.len() as u16);
            for &upvalue in &func.upvalues {
                writer.emit_i16(upvalue);
            }
            writer.emit_u32(func.code.len() as u32);
            writer.emit_bytes(&func.code);
        }
        writer.into_bytes()
    }

    /// Decode a module, allocating string constants on `heap`. The
    /// returned chunk's constants are rooted exactly as a freshly
    /// compiled chunk's are.
    pub fn decode(bytes: &[u8], heap: &Heap) -> Result<Chunk, ChunkError> {
        let mut reader = BytecodeReader::new(bytes);
        let mut magic = [0u8; 8];
        magic.copy_from_slice(reader.read_bytes(8)?);
        if magic != MAGIC {
            return Err(ChunkError::InvalidMagic(magic));
        }

        let mut chunk = Chunk::new(heap);
        let constant_count = reader.read_u32()? as usize;
        for _ in 0..constant_count {
            let value = match reader.read_u8()? {
                tags::NIL => Value::Nil,
                tags::BOOL => Value::Bool(reader.read_u8()? != 0),
                tags::INT => Value::Int(reader.read_i32()?),
                tags::REAL => Value::Real(reader.read_f64()?),
                tags::STR => Value::Ref(heap.alloc_str(reader.read_string()?)),
                other => return Err(ChunkError::InvalidConstantTag(other)),
            };
            chunk
                .add_constant(value)
                .ok_or(ChunkError::TooManyConstants)?;
        }

        let function_count = reader.read_u32()? as usize;
        for _ in 0..function_count {
            let arity = reader.read_u16()?;
            let upvalue_count = reader.read_u16()? as usize;
            let mut upvalues = Vec::with_capacity(upvalue_count);
            for _ in 0..upvalue_count {
                upvalues.push(reader.read_i16()?);
            }
            let code_len = reader.read_u32()? as usize;
            let code = reader.read_bytes(code_len)?.to_vec();
            chunk.functions.push(FunctionProto {
                arity,
                upvalues,
                code,
            });
        }
        Ok(chunk)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constants_grow_monotonically() {
        let heap = Heap::new();
        let mut chunk = Chunk::new(&heap);
        assert_eq!(chunk.add_constant(Value::Int(1)), Some(0));
        assert_eq!(chunk.add_constant(Value::Int(2)), Some(1));
        assert_eq!(chunk.add_string_constant("s"), Some(2));
        assert_eq!(chunk.constants().len(), 3);
        assert_eq!(chunk.constants()[2].as_str(), Some("s"));
    }

    #[test]
    fn test_constants_survive_collection() {
        let heap = Heap::new();
        let mut chunk = Chunk::new(&heap);
        chunk.add_string_constant("pinned through the chunk");
        heap.collect();
        assert_eq!(
            chunk.constants()[0].as_str(),
            Some("pinned through the chunk")
        );
        assert_eq!(heap.len(), 2); // constants vector + the string
    }

    #[test]
    fn test_patch_jump_forward() {
        let mut func = FunctionProto::default();
        let at = func.emit_jump(Opcode::JumpIfNot);
        func.emit_op(Opcode::Constant);
        func.emit_u16(0);
        func.emit_op(Opcode::Return);
        func.patch_jump(at).expect("patch");
        let displacement = i16::from_le_bytes([func.code[at], func.code[at + 1]]);
        assert_eq!(displacement, 4);
    }

    #[test]
    fn test_jump_back_is_negative() {
        let mut func = FunctionProto::default();
        func.emit_op(Opcode::NoOp);
        let head = func.position();
        func.emit_op(Opcode::Local);
        func.emit_i16(0);
        func.emit_jump_back(Opcode::Jump, head).expect("back jump");
        let at = func.position() - 2;
        let displacement = i16::from_le_bytes([func.code[at], func.code[at + 1]]);
        assert_eq!(displacement, -(func.position() as i16 - head as i16));
    }

    #[test]
    fn test_jump_out_of_range() {
        let mut func = FunctionProto::default();
        let at = func.emit_jump(Opcode::Jump);
        func.code.resize(func.code.len() + 40_000, Opcode::NoOp as u8);
        assert_eq!(func.patch_jump(at), Err(JumpOutOfRange));
    }

    #[test]
    fn test_encode_decode_round_trip() {
        let heap = Heap::new();
        let mut chunk = Chunk::new(&heap);
        chunk.add_constant(Value::Nil);
        chunk.add_constant(Value::Bool(true));
        chunk.add_constant(Value::Int(-7));
        chunk.add_constant(Value::Real(1.5));
        chunk.add_string_constant("name");
        let mut func = FunctionProto {
            arity: 2,
            upvalues: vec![0, -1],
            code: Vec::new(),
        };
        func.emit_op(Opcode::Local);
        func.emit_i16(-1);
        func.emit_op(Opcode::Return);
        chunk.functions.push(func);

        let bytes = chunk.encode();
        assert_eq!(&bytes[..8], &MAGIC);

        let decoded = Chunk::decode(&bytes, &heap).expect("decode");
        assert_eq!(decoded.constants().len(), 5);
        assert_eq!(decoded.constants()[0], Value::Nil);
        assert_eq!(decoded.constants()[2], Value::Int(-7));
        assert_eq!(decoded.constants()[4].as_str(), Some("name"));
        assert_eq!(decoded.functions.len(), 1);
        assert_eq!(decoded.functions[0].arity, 2);
        assert_eq!(decoded.functions[0].upvalues, vec![0, -1]);
        assert_eq!(decoded.functions[0].code, chunk.functions[0].code);
    }

    #[test]
    fn test_decode_rejects_bad_magic() {
        let heap = Heap::new();
        let mut bytes = Chunk::new(&heap).encode();
        bytes[0] = b'X';
        assert!(matches!(
            Chunk::decode(&bytes, &heap),
            Err(ChunkError::InvalidMagic(_))
        ));
    }

    #[test]
    fn test_decode_rejects_bad_tag() {
        let heap = Heap::new();
        let mut chunk = Chunk::new(&heap);
        chunk.add_constant(Value::Nil);
        let mut bytes = chunk.encode();
        bytes[12] = 9; // the constant's tag byte
        assert!(matches!(
            Chunk::decode(&bytes, &heap),
            Err(ChunkError::InvalidConstantTag(9))
        ));
    }

    #[test]
    fn test_decode_rejects_truncation() {
        let heap = Heap::new();
        let mut chunk = Chunk::new(&heap);
        chunk.add_constant(Value::Real(3.25));
        let bytes = chunk.encode();
        assert!(matches!(
            Chunk::decode(&bytes[..bytes.len() - 4], &heap),
            Err(ChunkError::Decode(DecodeError::UnexpectedEof(_)))
        ));
    }
}
