//! Validate command - screen recordings without processing them.

use std::path::PathBuf;

use clap::Args;

use eeg2source::io::{discover_inputs, validate_file, FdtPairReader, ValidationOutcome};

use super::common;
use crate::error::CliError;

/// Arguments for the validate command.
#[derive(Debug, Args)]
pub struct ValidateArgs {
    /// Recordings (.set) or directories containing them
    #[arg(required = true)]
    pub inputs: Vec<PathBuf>,

    /// Search directories recursively
    #[arg(long)]
    pub recursive: bool,
}

/// Run the validate command.
pub fn run(args: ValidateArgs) -> Result<i32, CliError> {
    let inputs = discover_inputs(&args.inputs, args.recursive)
        .map_err(|e| CliError::Inputs(e.to_string()))?;
    if inputs.is_empty() {
        return Err(CliError::Inputs("no .set recordings found".to_string()));
    }

    let reader = FdtPairReader::new();
    let mut rows = Vec::with_capacity(inputs.len());
    let mut all_passed = true;

    for input in &inputs {
        let report = validate_file(&reader, input);
        if !report.passed() {
            all_passed = false;
        }

        let file = input
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| input.display().to_string());

        let row = match &report.outcome {
            ValidationOutcome::Readable { meta, quality } => {
                let verdict = if quality.is_clean() { "pass" } else { "flagged" };
                vec![
                    file,
                    verdict.to_string(),
                    meta.n_channels.to_string(),
                    meta.n_epochs.to_string(),
                    format!("{} Hz", meta.sfreq_hz),
                    meta.montage.clone().unwrap_or_else(|| "-".to_string()),
                    quality.to_string(),
                ]
            }
            ValidationOutcome::Unreadable { reason } => vec![
                file,
                "unreadable".to_string(),
                "-".to_string(),
                "-".to_string(),
                "-".to_string(),
                "-".to_string(),
                reason.clone(),
            ],
        };
        rows.push(row);
    }

    let headers = [
        "FILE", "VERDICT", "CHANNELS", "EPOCHS", "RATE", "MONTAGE", "FINDINGS",
    ];
    print!("{}", common::render_table(&headers, &rows));

    println!();
    let passing = rows.iter().filter(|row| row[1] == "pass").count();
    println!("{} of {} recordings pass", passing, inputs.len());

    Ok(if all_passed { 0 } else { 1 })
}

#[cfg(test)]
mod tests {
    use super::*;
    use eeg2source::io::synth;

    #[test]
    fn clean_recordings_validate_with_exit_zero() {
        let dir = tempfile::tempdir().unwrap();
        let recording = synth::generate(8, 4, 64, 250.0, None, 7);
        synth::write_pair(&dir.path().join("subject.set"), &recording).unwrap();

        let args = ValidateArgs {
            inputs: vec![dir.path().to_path_buf()],
            recursive: false,
        };
        assert_eq!(run(args).unwrap(), 0);
    }

    #[test]
    fn unreadable_recording_fails_validation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.set");
        std::fs::write(&path, b"{ not a header").unwrap();

        let args = ValidateArgs {
            inputs: vec![path],
            recursive: false,
        };
        assert_eq!(run(args).unwrap(), 1);
    }

    #[test]
    fn missing_input_is_an_input_error() {
        let args = ValidateArgs {
            inputs: vec![PathBuf::from("/nonexistent/rec.set")],
            recursive: false,
        };
        assert!(run(args).is_err());
    }
}
