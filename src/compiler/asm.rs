//! # Inline Assembly
//!
//! `asm` tagged templates hold WebAssembly text. The text is wrapped into a
//! module that imports the shared memory, handed to an external assembler
//! (`wat2wasm` by default) and replaced by the assembled binary as a base64
//! string literal.
//!
//! The assembler reports errors as `<file>:<line>:<col>: error: <message>`,
//! optionally followed by context lines. Line numbers refer to the wrapped
//! file; [`parse_errors`] turns them back into lines of the template text.

use super::memory_model::AddressingWidth;
use crate::{Error, Result};
use base64::Engine;
use lazy_static::lazy_static;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};

/// Stem of the generated input and output files
pub const FILE_STEM: &str = "__memlower_asm_tmp";
/// Literal substituted for an asm block that failed to assemble
pub const FAILURE_STUB: &str = "compile asm error";

// lines of the wrapper that precede the template text
const PROLOGUE_LINES: u32 = 2;

lazy_static! {
    static ref LOCATION_RE: Regex = Regex::new(r"__memlower_asm_tmp(?:_\d+_\d+)?\.wat:(\d+)").unwrap();
}

static NEXT_SCRATCH: AtomicU64 = AtomicU64::new(0);

/// Input and output files of one assembler run, removed on drop
struct Scratch {
    input: PathBuf,
    output: PathBuf,
}

impl Scratch {
    /// Fresh names under `dir`, unique per process and per run
    fn new(dir: &Path) -> Self {
        let stem = format!(
            "{}_{}_{}",
            FILE_STEM,
            std::process::id(),
            NEXT_SCRATCH.fetch_add(1, Ordering::Relaxed)
        );
        Self {
            input: dir.join(format!("{}.wat", stem)),
            output: dir.join(format!("{}.wasm", stem)),
        }
    }
}

impl Drop for Scratch {
    fn drop(&mut self) {
        for path in [&self.input, &self.output] {
            if let Err(e) = std::fs::remove_file(path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!("could not remove {}: {}", path.display(), e);
                }
            }
        }
    }
}

/// One error reported by the assembler
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AsmError {
    /// Message, including any context lines the assembler printed after it
    pub message: String,
    /// 0-based line of the template text
    pub line: u32,
}

/// Result of running the assembler
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AsmOutcome {
    /// Assembled module bytes
    Assembled(Vec<u8>),
    /// The assembler rejected the text
    Rejected(Vec<AsmError>),
}

/// Bridge to the external assembler
#[derive(Debug, Clone)]
pub struct AsmCompiler {
    assembler: PathBuf,
    temp_dir: PathBuf,
    width: AddressingWidth,
}

impl AsmCompiler {
    /// Create a bridge; `temp_dir` defaults to the system temporary directory
    pub fn new(assembler: impl Into<PathBuf>, temp_dir: Option<PathBuf>, width: AddressingWidth) -> Self {
        Self {
            assembler: assembler.into(),
            temp_dir: temp_dir.unwrap_or_else(std::env::temp_dir),
            width,
        }
    }

    /// Wrap template text into a module importing the shared memory
    pub fn wrap(&self, text: &str) -> String {
        let memory = if self.width.is_64() {
            "(memory i64 1 65536 shared)"
        } else {
            "(memory 1 65536 shared)"
        };
        format!(
            "(module\n  (import \"env\" \"memory\" {})\n{}\n)\n",
            memory, text
        )
    }

    /// Assemble `text`, blocking until the assembler exits
    ///
    /// Returns an error only when the assembler cannot be run at all or its
    /// files cannot be accessed; rejected input is an [`AsmOutcome::Rejected`].
    pub fn compile(&self, text: &str) -> Result<AsmOutcome> {
        std::fs::create_dir_all(&self.temp_dir).map_err(|e| Error::io(&self.temp_dir, e))?;
        let scratch = Scratch::new(&self.temp_dir);
        let (input, output) = (&scratch.input, &scratch.output);
        std::fs::write(input, self.wrap(text)).map_err(|e| Error::io(input, e))?;

        let mut command = Command::new(&self.assembler);
        command
            .arg(input)
            .args(["--enable-simd", "--enable-threads"]);
        if self.width.is_64() {
            command.arg("--enable-memory64");
        }
        tracing::debug!("running {} on {}", self.assembler.display(), input.display());
        let result = command
            .arg("-o")
            .arg(output)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .map_err(|e| Error::Assembler {
                message: format!("failed to run {}: {}", self.assembler.display(), e),
            })?;

        if result.status.success() {
            let bytes = std::fs::read(output).map_err(|e| Error::io(output, e))?;
            return Ok(AsmOutcome::Assembled(bytes));
        }

        let stderr = String::from_utf8_lossy(&result.stderr);
        let mut errors = parse_errors(&stderr);
        if errors.is_empty() {
            // no located error; keep whatever the assembler said
            let message = stderr.trim();
            errors.push(AsmError {
                message: if message.is_empty() {
                    format!("assembler exited with {}", result.status)
                } else {
                    message.to_string()
                },
                line: 0,
            });
        }
        Ok(AsmOutcome::Rejected(errors))
    }

    /// Assembler executable
    pub fn assembler(&self) -> &Path {
        &self.assembler
    }
}

/// Split assembler stderr into located errors
///
/// A line naming the input file starts a new error whose message is the text
/// after `error: `; every other non-empty line is appended to the current one.
pub fn parse_errors(stderr: &str) -> Vec<AsmError> {
    let mut errors: Vec<AsmError> = Vec::new();
    for line in stderr.lines() {
        if let Some(caps) = LOCATION_RE.captures(line) {
            let file_line: u32 = caps
                .get(1)
                .and_then(|m| m.as_str().parse().ok())
                .unwrap_or(0);
            let message = line.rsplit("error: ").next().unwrap_or(line).to_string();
            errors.push(AsmError {
                message,
                line: file_line.saturating_sub(PROLOGUE_LINES + 1),
            });
        } else if !line.is_empty() {
            if let Some(current) = errors.last_mut() {
                current.message.push('\n');
                current.message.push_str(line);
            }
        }
    }
    errors
}

/// Character range `(start, end)` of a text line, leading whitespace skipped
pub fn line_range(text: &str, line: u32) -> (u32, u32) {
    let chars: Vec<char> = text.chars().collect();
    let mut pos = 0usize;
    let mut remaining = line;
    while remaining > 0 && pos < chars.len() {
        if chars[pos] == '\n' {
            remaining -= 1;
        }
        pos += 1;
    }
    while pos < chars.len() && chars[pos].is_whitespace() && chars[pos] != '\n' {
        pos += 1;
    }
    let start = pos;
    while pos < chars.len() && chars[pos] != '\n' {
        pos += 1;
    }
    (start as u32, pos as u32)
}

/// Encode an assembled module for embedding as a string literal
pub fn encode(bytes: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrap_puts_text_after_prologue() {
        let asm = AsmCompiler::new("wat2wasm", None, AddressingWidth::Bits32);
        let wrapped = asm.wrap("(func)");
        let lines: Vec<&str> = wrapped.lines().collect();
        assert_eq!(lines[0], "(module");
        assert!(lines[1].contains("(memory 1 65536 shared)"));
        assert_eq!(lines[PROLOGUE_LINES as usize], "(func)");

        let wide = AsmCompiler::new("wat2wasm", None, AddressingWidth::Bits64);
        assert!(wide.wrap("").contains("(memory i64 1 65536 shared)"));
    }

    #[test]
    fn test_parse_errors_groups_context_lines() {
        let stderr = "/tmp/__memlower_asm_tmp.wat:4:5: error: unexpected token \"i32.ad\"\n\
                      \x20   i32.ad\n\
                      \x20   ^^^^^^\n\
                      /tmp/__memlower_asm_tmp.wat:6:1: error: undefined local\n";
        let errors = parse_errors(stderr);
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].line, 1);
        assert!(errors[0].message.starts_with("unexpected token"));
        assert!(errors[0].message.contains("^^^^^^"));
        assert_eq!(errors[1].line, 3);
        assert_eq!(errors[1].message, "undefined local");
    }

    #[test]
    fn test_parse_errors_ignores_unlocated_noise() {
        assert!(parse_errors("warning: something\n").is_empty());
    }

    #[test]
    fn test_line_range_skips_indentation() {
        let text = "\n  (func $f\n    i32.add)\n";
        assert_eq!(line_range(text, 1), (3, 11));
        assert_eq!(line_range(text, 2), (16, 24));
        assert_eq!(line_range(text, 0), (0, 0));
    }

    #[test]
    fn test_encode() {
        assert_eq!(encode(b"\0asm"), "AGFzbQ==");
    }

    #[test]
    fn test_missing_assembler_is_an_error() {
        let dir = std::env::temp_dir().join(format!("memlower-asm-missing-{}", std::process::id()));
        let asm = AsmCompiler::new("/nonexistent/memlower-wat2wasm", Some(dir), AddressingWidth::Bits32);
        assert!(matches!(asm.compile("(func)"), Err(Error::Assembler { .. })));
    }

    #[cfg(unix)]
    fn fake_assembler(dir: &Path, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;
        std::fs::create_dir_all(dir).unwrap();
        let path = dir.join("fake-wat2wasm.sh");
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[cfg(unix)]
    #[test]
    fn test_fake_assembler_success() {
        let dir = std::env::temp_dir().join(format!("memlower-asm-ok-{}", std::process::id()));
        let script = fake_assembler(&dir, "for last; do :; done\nprintf 'wasm' > \"$last\"");
        let asm = AsmCompiler::new(script, Some(dir.clone()), AddressingWidth::Bits32);
        assert_eq!(
            asm.compile("(func)").unwrap(),
            AsmOutcome::Assembled(b"wasm".to_vec())
        );
        let _ = std::fs::remove_dir_all(dir);
    }

    #[cfg(unix)]
    #[test]
    fn test_fake_assembler_rejection() {
        let dir = std::env::temp_dir().join(format!("memlower-asm-err-{}", std::process::id()));
        let script = fake_assembler(
            &dir,
            "echo \"$1:4:3: error: unexpected token\" >&2\nexit 1",
        );
        let asm = AsmCompiler::new(script, Some(dir.clone()), AddressingWidth::Bits32);
        let AsmOutcome::Rejected(errors) = asm.compile("\n  bad").unwrap() else {
            panic!("expected rejection");
        };
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].line, 1);
        assert_eq!(errors[0].message, "unexpected token");
        let _ = std::fs::remove_dir_all(dir);
    }

    #[cfg(unix)]
    fn scratch_files(dir: &Path) -> Vec<String> {
        std::fs::read_dir(dir)
            .unwrap()
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .filter(|name| name.starts_with(FILE_STEM))
            .collect()
    }

    #[cfg(unix)]
    #[test]
    fn test_scratch_files_are_removed_after_each_run() {
        let dir = std::env::temp_dir().join(format!("memlower-asm-clean-{}", std::process::id()));
        let ok = fake_assembler(&dir, "for last; do :; done\nprintf 'wasm' > \"$last\"");
        let asm = AsmCompiler::new(ok, Some(dir.clone()), AddressingWidth::Bits32);
        asm.compile("(func)").unwrap();
        asm.compile("(func)").unwrap();
        assert!(scratch_files(&dir).is_empty());

        let bad = fake_assembler(&dir, "echo \"$1:3:1: error: bad\" >&2\nexit 1");
        let asm = AsmCompiler::new(bad, Some(dir.clone()), AddressingWidth::Bits32);
        assert!(matches!(asm.compile("bad").unwrap(), AsmOutcome::Rejected(_)));
        assert!(scratch_files(&dir).is_empty());
        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn test_scratch_names_are_unique() {
        let dir = std::env::temp_dir();
        let (a, b) = (Scratch::new(&dir), Scratch::new(&dir));
        assert_ne!(a.input, b.input);
        assert_ne!(a.output, b.output);
        let stderr = format!("{}:5:2: error: oops\n", a.input.display());
        assert_eq!(parse_errors(&stderr)[0].line, 2);
    }
}
