//! Regex substitution of numeric constants in firmware sources
//!
//! Handles the two declaration shapes the firmware uses:
//!
//! ```c
//! #define IMU1PITCHOFFSET 0.034907  // radians, from calibration
//! float calibration_factor = 696.50;
//! ```
//!
//! Only the numeric literal is replaced; indentation, spacing, and any
//! trailing comment survive untouched. A constant that matches neither
//! shape is an error, never a silent no-op.

use crate::error::{Error, Result};
use regex::Regex;
use std::fs;
use std::path::Path;

/// Decimal places for angle offsets
const DEFAULT_DECIMALS: usize = 6;

/// Decimal places for the load cell factor declaration
const FACTOR_DECIMALS: usize = 2;

/// Substitute `name`'s numeric literal, reporting whether anything
/// matched. No match returns the content unchanged with `false`; it is
/// the caller's job to care.
pub fn try_patch_constant(
    content: &str,
    name: &str,
    value: f64,
    decimals: usize,
) -> Result<(String, bool)> {
    let formatted = format!("{:.*}", decimals, value);
    let escaped = regex::escape(name);

    // `#define NAME <numeric>` — the numeric token only, so a trailing
    // comment is left alone
    let define_re = Regex::new(&format!(
        r"(?m)^(?P<head>\s*#define\s+{escaped}\s+)(?P<num>-?\d+(?:\.\d+)?)"
    ))
    .map_err(|e| Error::Other(format!("constant pattern: {}", e)))?;
    if define_re.is_match(content) {
        let patched = define_re
            .replacen(content, 1, format!("${{head}}{formatted}"))
            .into_owned();
        return Ok((patched, true));
    }

    // `float NAME = <numeric>;`
    let float_re = Regex::new(&format!(
        r"(?m)^(?P<head>\s*float\s+{escaped}\s*=\s*)(?P<num>-?\d+(?:\.\d+)?)(?P<tail>\s*;)"
    ))
    .map_err(|e| Error::Other(format!("constant pattern: {}", e)))?;
    if float_re.is_match(content) {
        let patched = float_re
            .replacen(content, 1, format!("${{head}}{formatted}${{tail}}"))
            .into_owned();
        return Ok((patched, true));
    }

    Ok((content.to_string(), false))
}

/// Patch `name` to `value` with six decimal places
pub fn patch_constant(content: &str, name: &str, value: f64) -> Result<String> {
    patch_constant_with_precision(content, name, value, DEFAULT_DECIMALS)
}

/// Patch `name` to `value` with an explicit number of decimal places.
/// Unlike [`try_patch_constant`], a missing constant is an error.
pub fn patch_constant_with_precision(
    content: &str,
    name: &str,
    value: f64,
    decimals: usize,
) -> Result<String> {
    match try_patch_constant(content, name, value, decimals)? {
        (patched, true) => Ok(patched),
        (_, false) => Err(Error::PatternNotFound(name.to_string())),
    }
}

/// Patch the `float calibration_factor = <v>;` declaration, two decimals
pub fn patch_calibration_factor(content: &str, factor: f64) -> Result<String> {
    patch_constant_with_precision(content, super::CALIBRATION_FACTOR_NAME, factor, FACTOR_DECIMALS)
}

/// Apply a set of `(name, value)` updates to a firmware file in place.
///
/// With `backup` set, the original content is first written to a
/// `.backup` sibling — only if one does not already exist, so the first
/// pristine copy is what survives repeated patch runs.
pub fn patch_file<P: AsRef<Path>>(path: P, updates: &[(&str, f64)], backup: bool) -> Result<()> {
    patch_file_inner(path.as_ref(), updates, DEFAULT_DECIMALS, backup)
}

/// Patch the load cell factor declaration in a firmware file in place
pub fn patch_factor_file<P: AsRef<Path>>(path: P, factor: f64, backup: bool) -> Result<()> {
    patch_file_inner(
        path.as_ref(),
        &[(super::CALIBRATION_FACTOR_NAME, factor)],
        FACTOR_DECIMALS,
        backup,
    )
}

fn patch_file_inner(path: &Path, updates: &[(&str, f64)], decimals: usize, backup: bool) -> Result<()> {
    let content = fs::read_to_string(path)?;

    let mut patched = content.clone();
    for (name, value) in updates {
        patched = patch_constant_with_precision(&patched, name, *value, decimals)?;
    }

    if backup {
        let backup_path = path.with_extension(format!(
            "{}.backup",
            path.extension().and_then(|e| e.to_str()).unwrap_or("ino")
        ));
        if !backup_path.exists() {
            fs::write(&backup_path, &content)?;
            log::info!("Backup saved as: {}", backup_path.display());
        }
    }

    fs::write(path, patched)?;
    log::info!("Patched {} constant(s) in {}", updates.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn define_roundtrip_preserves_comment() {
        let src = "#define FOO 1.000000 // comment\n";
        let out = patch_constant(src, "FOO", 2.5).unwrap();
        assert_eq!(out, "#define FOO 2.500000 // comment\n");
    }

    #[test]
    fn float_declaration_is_patched() {
        let src = "int x = 3;\nfloat calibration_factor = 1.0;\n";
        let out = patch_calibration_factor(src, 696.504).unwrap();
        assert_eq!(out, "int x = 3;\nfloat calibration_factor = 696.50;\n");
    }

    #[test]
    fn float_trailing_comment_survives() {
        let src = "float FOO = -12.5; // grams per tick\n";
        let out = patch_constant(src, "FOO", 3.0).unwrap();
        assert_eq!(out, "float FOO = 3.000000; // grams per tick\n");
    }

    #[test]
    fn absent_name_leaves_content_unchanged() {
        let src = "#define BAR 1.0\n";
        let (out, changed) = try_patch_constant(src, "FOO", 2.0, 6).unwrap();
        assert!(!changed);
        assert_eq!(out, src);
    }

    #[test]
    fn absent_name_is_an_error_in_checked_form() {
        let src = "#define BAR 1.0\n";
        let err = patch_constant(src, "FOO", 2.0).unwrap_err();
        assert!(matches!(err, Error::PatternNotFound(name) if name == "FOO"));
    }

    #[test]
    fn name_is_not_matched_as_substring() {
        // FOO must not rewrite FOOBAR
        let src = "#define FOOBAR 1.000000\n";
        assert!(patch_constant(src, "FOO", 2.0).is_err());
    }

    #[test]
    fn only_first_occurrence_is_replaced() {
        let src = "#define FOO 1.0\n#define FOO 1.0\n";
        let out = patch_constant(src, "FOO", 2.0).unwrap();
        assert_eq!(out, "#define FOO 2.000000\n#define FOO 1.0\n");
    }

    #[test]
    fn negative_values_match_and_format() {
        let src = "#define IMU1ROLLOFFSET -0.004363\n";
        let out = patch_constant(src, "IMU1ROLLOFFSET", -0.011).unwrap();
        assert_eq!(out, "#define IMU1ROLLOFFSET -0.011000\n");
    }

    #[test]
    fn indentation_is_kept() {
        let src = "  #define FOO 7\n";
        let out = patch_constant(src, "FOO", 1.5).unwrap();
        assert_eq!(out, "  #define FOO 1.500000\n");
    }

    #[test]
    fn patch_file_writes_backup_once() {
        let dir = std::env::temp_dir().join(format!("mars-cal-test-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("firmware.ino");
        fs::write(&path, "float calibration_factor = 1.0;\n").unwrap();

        patch_file(&path, &[("calibration_factor", 2.0)], true).unwrap();
        let backup = dir.join("firmware.ino.backup");
        assert_eq!(
            fs::read_to_string(&backup).unwrap(),
            "float calibration_factor = 1.0;\n"
        );

        // Second patch must not clobber the pristine backup
        patch_file(&path, &[("calibration_factor", 3.0)], true).unwrap();
        assert_eq!(
            fs::read_to_string(&backup).unwrap(),
            "float calibration_factor = 1.0;\n"
        );
        assert!(fs::read_to_string(&path)
            .unwrap()
            .contains("3.000000"));

        fs::remove_dir_all(&dir).unwrap();
    }
}
