//! CLI Exit Code Registry
//!
//! This is the single source of truth for all CLI exit codes.
//! Exit codes are part of the shell contract; scripts rely on them.
//!
//! | Code | Meaning                                              |
//! |------|------------------------------------------------------|
//! | 0    | Every check that ran is clean                        |
//! | 1    | At least one check reported discrepancies or skipped |
//! | 2    | CLI usage error (bad args, unknown check or kind)    |
//! | 3    | Config file does not parse or fails validation       |
//! | 4    | Input or output file could not be read or written    |
//! | 5    | No input documents found                             |
//!
//! # Adding New Exit Codes
//!
//! 1. Add the constant
//! 2. Document what triggers it
//! 3. Update the table above
//! 4. Wire it into the relevant command's error handling

/// Success - every check that ran is clean.
pub const EXIT_SUCCESS: u8 = 0;

/// Discrepancies found. Like `diff(1)`, exit 1 means "inputs disagree".
/// A skipped check (missing column, unusable key) also counts.
pub const EXIT_FINDINGS: u8 = 1;

/// Usage error - bad arguments, unknown check name or document kind.
/// Clap's own argument errors use the same code.
pub const EXIT_USAGE: u8 = 2;

/// Config file failed to parse or validate.
pub const EXIT_INVALID_CONFIG: u8 = 3;

/// A file could not be read, parsed, or written.
pub const EXIT_IO: u8 = 4;

/// The input directory holds no file matching a document prefix.
pub const EXIT_NO_DOCUMENTS: u8 = 5;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_distinct() {
        let codes = [
            EXIT_SUCCESS,
            EXIT_FINDINGS,
            EXIT_USAGE,
            EXIT_INVALID_CONFIG,
            EXIT_IO,
            EXIT_NO_DOCUMENTS,
        ];
        for (i, a) in codes.iter().enumerate() {
            for b in &codes[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }
}
