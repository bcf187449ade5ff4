/// Model file download from HuggingFace.
///
/// Fetches the ONNX export and tokenizer of the configured embedding model
/// if they don't already exist locally.
use std::fs;
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

/// Local file name and path inside the HuggingFace repo.
pub const MODEL_FILES: &[(&str, &str)] = &[
    ("model.onnx", "onnx/model.onnx"),
    ("tokenizer.json", "tokenizer.json"),
    ("config.json", "config.json"),
];

/// Download URL of `path` in HuggingFace repo `repo`.
#[must_use]
pub fn file_url(repo: &str, path: &str) -> String {
    format!("https://huggingface.co/{repo}/resolve/main/{path}")
}

/// Check whether all required model files exist in `model_dir`.
#[must_use]
pub fn all_files_present(model_dir: &Path) -> bool {
    MODEL_FILES
        .iter()
        .all(|(name, _)| model_dir.join(name).exists())
}

/// Download model files from `repo` into `model_dir`, skipping those present.
///
/// Blocking; call from a blocking context.
pub fn download_model_files(repo: &str, model_dir: &Path) -> Result<()> {
    info!("Checking model files in {}", model_dir.display());

    fs::create_dir_all(model_dir)
        .with_context(|| format!("failed to create models directory: {}", model_dir.display()))?;

    if all_files_present(model_dir) {
        info!("All model files found, skipping download");
        return Ok(());
    }

    eprintln!("[INFO] Downloading {repo} from HuggingFace...");

    for &(filename, url_path) in MODEL_FILES {
        let dest = model_dir.join(filename);

        if dest.exists() {
            info!("File already exists: {filename}");
            continue;
        }

        eprintln!("[INFO] Downloading {filename}...");
        download_file(&dest, &file_url(repo, url_path))
            .with_context(|| format!("failed to download {filename}"))?;
    }

    eprintln!("[INFO] Model download complete!");
    Ok(())
}

fn download_file(dest: &Path, url: &str) -> Result<()> {
    let resp =
        reqwest::blocking::get(url).with_context(|| format!("HTTP request failed: {url}"))?;

    if !resp.status().is_success() {
        anyhow::bail!("bad status: {} for {url}", resp.status());
    }

    let total = resp.content_length().unwrap_or(0);

    let pb = if total > 0 {
        let pb = ProgressBar::new(total);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("  {bar:40.cyan/blue} {percent}% ({bytes}/{total_bytes}) {msg}")
        {
            pb.set_style(style.progress_chars("█▓░"));
        }
        pb
    } else {
        ProgressBar::new_spinner()
    };

    // Only a fully written file ever appears under `dest`.
    let partial = dest.with_extension("part");
    let mut file = fs::File::create(&partial)
        .with_context(|| format!("failed to create file: {}", partial.display()))?;

    let bytes = resp.bytes().context("failed to read response body")?;
    file.write_all(&bytes).context("failed to write file")?;
    pb.set_position(bytes.len() as u64);
    pb.finish_and_clear();

    fs::rename(&partial, dest)
        .with_context(|| format!("failed to move {} into place", partial.display()))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_url() {
        assert_eq!(
            file_url("dangvantuan/vietnamese-embedding", "onnx/model.onnx"),
            "https://huggingface.co/dangvantuan/vietnamese-embedding/resolve/main/onnx/model.onnx"
        );
    }

    #[test]
    fn test_all_files_present_empty_dir() {
        let temp = tempfile::tempdir().unwrap();
        assert!(!all_files_present(temp.path()));
    }

    #[test]
    fn test_all_files_present_complete() {
        let temp = tempfile::tempdir().unwrap();
        for &(name, _) in MODEL_FILES {
            fs::write(temp.path().join(name), "dummy").unwrap();
        }
        assert!(all_files_present(temp.path()));
    }

    #[test]
    fn test_all_files_present_partial() {
        let temp = tempfile::tempdir().unwrap();
        fs::write(temp.path().join("tokenizer.json"), "dummy").unwrap();
        assert!(!all_files_present(temp.path()));
    }

    #[test]
    fn test_download_skips_when_present() {
        let temp = tempfile::tempdir().unwrap();
        for &(name, _) in MODEL_FILES {
            fs::write(temp.path().join(name), "dummy").unwrap();
        }
        // No network access needed when everything is already there
        download_model_files("nobody/nothing", temp.path()).unwrap();
    }
}
