//! Serialization round trips through a real file.

use std::fs;

use somir_engine::bytecode::disasm::disassemble;
use somir_engine::bytecode::MAGIC;
use somir_engine::compiler::Compiler;
use somir_engine::gc::Heap;
use somir_engine::parser::parse_program;
use somir_engine::Chunk;

const PROGRAM: &str = concat!(
    "let greeting = 'hello'\n",
    "let f = fn(n: int) -> int:\n",
    "    if n <= 0:\n",
    "        return 0\n",
    "    else:\n",
    "        return f(n - 1) + n\n",
    "let xs = [1.0, 2.5]\n",
    "print(greeting.length())\n",
);

fn compile(source: &str) -> Chunk {
    let mut program = parse_program(source).expect("parse");
    Compiler::new(Heap::new())
        .compile_program(&mut program)
        .expect("compile")
}

#[test]
fn module_survives_a_file_round_trip() {
    let chunk = compile(PROGRAM);
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("program.smc");
    fs::write(&path, chunk.encode()).expect("write");

    let bytes = fs::read(&path).expect("read");
    assert_eq!(&bytes[..8], &MAGIC);

    let heap = Heap::new();
    let decoded = Chunk::decode(&bytes, &heap).expect("decode");
    assert_eq!(disassemble(&decoded), disassemble(&chunk));
}

#[test]
fn decoded_constants_stay_rooted_across_collection() {
    let chunk = compile(PROGRAM);
    let bytes = chunk.encode();

    let heap = Heap::new();
    let decoded = Chunk::decode(&bytes, &heap).expect("decode");
    heap.collect();
    let strings: Vec<&str> = decoded
        .constants()
        .iter()
        .filter_map(|value| value.as_str())
        .collect();
    assert!(strings.contains(&"hello"));
    assert!(strings.contains(&"print"));
}

#[test]
fn truncated_module_is_rejected() {
    let chunk = compile("let x = 1");
    let bytes = chunk.encode();
    assert!(Chunk::decode(&bytes[..bytes.len() - 1], &Heap::new()).is_err());
}
