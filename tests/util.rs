//! Shared test utilities for integration tests
//!
//! Synthesizes `objdump -d -M intel`-shaped listings from a seeded
//! instruction generator so corpora are varied but reproducible.

#![allow(dead_code)]

use assert_fs::prelude::*;

/// Instruction palette; covers every operand class the normalizer knows
pub const PALETTE: &[&str] = &[
    "push ebp",
    "mov ebp,esp",
    "mov eax,DWORD PTR [ebp+0x8]",
    "add eax,0x1",
    "call 8048300",
    "cmp eax,0x10",
    "jne 8048420",
    "lea edx,[eax+0x4]",
    "pop ebp",
    "ret",
    "sub esp,0x18",
    "xor eax,eax",
    "test eax,eax",
    "movzx ecx,BYTE PTR [edx]",
];

/// splitmix64 step
fn next(state: &mut u64) -> u64
{
    *state = state.wrapping_add(0x9e37_79b9_7f4a_7c15);
    let mut z = *state;
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

/// `n` pseudo-random instructions for `seed`
pub fn instructions(
    seed: u64,
    n: usize,
) -> Vec<String>
{
    let mut state = seed;
    (0..n)
        .map(|_| PALETTE[(next(&mut state) % PALETTE.len() as u64) as usize].to_string())
        .collect()
}

/// One listing line with the instruction text at column 32
pub fn listing_line(
    addr: u64,
    ins: &str,
) -> String
{
    format!("{:<32}{}", format!("  {addr:x}:"), ins)
}

/// Instruction lines only (query listings carry no banner)
pub fn bare_listing(body: &[String]) -> String
{
    body.iter()
        .enumerate()
        .map(|(i, ins)| listing_line(0x8048400 + i as u64, ins))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Six banner lines, one function header, then the instructions
pub fn objdump_listing(
    name: &str,
    body: &[String],
) -> String
{
    objdump_functions(name, &[(name, body.to_vec())])
}

/// Six banner lines, then each function's header followed by its body
pub fn objdump_functions(
    file: &str,
    functions: &[(&str, Vec<String>)],
) -> String
{
    let mut lines = vec![
        String::new(),
        format!("{file}:     file format elf32-i386"),
        String::new(),
        String::new(),
        "Disassembly of section .text:".to_string(),
        String::new(),
    ];
    for (i, (name, body)) in functions
        .iter()
        .enumerate()
    {
        lines.push(format!("{:08x} <{name}>:", 0x8048400 + 0x100 * i));
        lines.push(bare_listing(body));
    }
    lines.join("\n")
}

/// Instructions per corpus listing
pub const LISTING_LEN: usize = 120;

/// `corpus/{a,b,c}.txt` with seeds 1, 2, 3 plus an ignored `notes.md`
pub fn make_corpus() -> assert_fs::TempDir
{
    let tmp = assert_fs::TempDir::new().expect("tempdir");

    for (name, seed) in [("a", 1), ("b", 2), ("c", 3)]
    {
        tmp.child(format!("corpus/{name}.txt"))
            .write_str(&objdump_listing(name, &instructions(seed, LISTING_LEN)))
            .expect("write listing");
    }

    tmp.child("corpus/notes.md")
        .write_str("not a listing\n")
        .expect("write notes");

    tmp
}

/// Query listing copying `len` instructions of corpus file `b` from `start`
pub fn write_query_from_b(
    tmp: &assert_fs::TempDir,
    start: usize,
    len: usize,
) -> std::path::PathBuf
{
    let body = instructions(2, LISTING_LEN);
    let child = tmp.child("query.txt");
    child
        .write_str(&bare_listing(&body[start..start + len]))
        .expect("write query");
    child
        .path()
        .to_path_buf()
}
