use crate::error::{Result, WatermapError};
use crate::formats::FormatValidation;
use std::path::Path;

pub struct FormatValidator;

impl FormatValidator {
    /// Validate that a file exists and is readable
    pub fn validate_file_exists(path: &Path) -> FormatValidation {
        let mut validation = FormatValidation::default();

        if !path.exists() {
            validation.errors.push(format!("File not found: {}", path.display()));
            return validation;
        }
        if !path.is_file() {
            validation.errors.push(format!("Path is not a file: {}", path.display()));
            return validation;
        }
        if let Err(e) = std::fs::metadata(path) {
            validation.errors.push(format!("Cannot access file: {}", e));
        }

        validation
    }

    /// Validate that required component files exist for multi-file formats
    pub fn validate_component_files(
        base_path: &Path,
        required_extensions: &[&str],
        optional_extensions: &[&str],
    ) -> FormatValidation {
        let mut validation = FormatValidation::default();

        for ext in required_extensions {
            let component_path = base_path.with_extension(ext);
            if !component_path.exists() {
                validation
                    .errors
                    .push(format!("Missing required file: {}", component_path.display()));
            }
        }

        for ext in optional_extensions {
            let component_path = base_path.with_extension(ext);
            if !component_path.exists() {
                validation.warnings.push(format!(
                    "Optional file not found: {} (may affect functionality)",
                    component_path.display()
                ));
            }
        }

        validation
    }

    /// Validate that a file starts with the expected magic bytes
    pub fn validate_magic(path: &Path, magic: &[u8], format_name: &str) -> FormatValidation {
        use std::io::Read;

        let mut validation = FormatValidation::default();
        let mut header = vec![0u8; magic.len()];

        match std::fs::File::open(path).and_then(|mut f| f.read_exact(&mut header)) {
            Ok(()) if header == magic => {}
            Ok(()) => validation
                .errors
                .push(format!("File is not a valid {} file: unexpected header", format_name)),
            Err(e) => validation.errors.push(format!("Cannot read file header: {}", e)),
        }

        validation
    }

    /// Merge multiple validation results
    pub fn merge_validations(validations: Vec<FormatValidation>) -> FormatValidation {
        let mut merged = FormatValidation::default();

        for validation in validations {
            merged.errors.extend(validation.errors);
            merged.warnings.extend(validation.warnings);
        }

        merged
    }

    /// Convert a validation result to a Result type
    pub fn validation_to_result(validation: &FormatValidation, format_name: &str) -> Result<()> {
        if !validation.is_valid() {
            Err(WatermapError::FormatError {
                format: format_name.to_string(),
                message: validation.errors.join("; "),
            })
        } else {
            Ok(())
        }
    }
}

/// Check if a path has a specific extension (case-insensitive)
pub fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case(ext))
        .unwrap_or(false)
}

/// Verify that a file exists and is a regular file
pub fn verify_file_exists(path: &Path) -> Result<()> {
    if !path.exists() {
        return Err(WatermapError::FileNotFound {
            path: path.to_path_buf(),
        });
    }

    if !path.is_file() {
        return Err(WatermapError::InvalidArgument {
            reason: format!("{} is not a file", path.display()),
        });
    }

    Ok(())
}
