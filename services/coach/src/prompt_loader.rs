use anyhow::{Context, Result};
use interview_core::profile::InterviewProfile;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

const PROFILE_FILE: &str = "resume.json";

/// Reads every `*.md` file in `dir_path`, keyed by file stem.
pub fn load_prompts(dir_path: &Path) -> Result<HashMap<String, String>> {
    let mut prompts = HashMap::new();

    for entry in fs::read_dir(dir_path)
        .with_context(|| format!("Failed to read prompts directory: {}", dir_path.display()))?
    {
        let path = entry?.path();
        if !path.is_file() || path.extension().and_then(|s| s.to_str()) != Some("md") {
            continue;
        }

        let key = path
            .file_stem()
            .and_then(|s| s.to_str())
            .context("Could not get file stem for prompt file")?
            .to_string();
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read prompt file: {}", path.display()))?;
        prompts.insert(key, content.trim().to_string());
    }

    Ok(prompts)
}

/// Loads `resume.json` from `dir_path`. A missing file is not an error;
/// a malformed one is.
pub fn load_profile(dir_path: &Path) -> Result<Option<InterviewProfile>> {
    let path = dir_path.join(PROFILE_FILE);
    if !path.is_file() {
        return Ok(None);
    }
    let raw = fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let profile = InterviewProfile::from_json(&raw)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    Ok(Some(profile))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn markdown_files_become_trimmed_prompts() -> Result<()> {
        // Arrange
        let dir = tempdir()?;
        let mut interviewer = File::create(dir.path().join("interviewer.md"))?;
        writeln!(interviewer, "You are a hiring manager.\n")?;
        fs::write(dir.path().join("notes.txt"), "ignored")?;
        fs::create_dir(dir.path().join("drafts.md"))?;

        // Act
        let prompts = load_prompts(dir.path())?;

        // Assert
        assert_eq!(prompts.len(), 1);
        assert_eq!(prompts["interviewer"], "You are a hiring manager.");
        Ok(())
    }

    #[test]
    fn missing_prompt_directory_is_an_error() {
        assert!(load_prompts(Path::new("no_such_prompts_dir")).is_err());
    }

    #[test]
    fn profile_is_optional() -> Result<()> {
        let dir = tempdir()?;
        assert!(load_profile(dir.path())?.is_none());
        Ok(())
    }

    #[test]
    fn profile_is_parsed_when_present() -> Result<()> {
        let dir = tempdir()?;
        fs::write(
            dir.path().join(PROFILE_FILE),
            r#"{
                "candidate": {
                    "summary": "Backend engineer",
                    "skills": ["Rust", "Postgres"],
                    "experience": [{ "company": "Acme", "role": "Staff Engineer" }]
                },
                "job": { "position": "Principal Engineer", "company": "Initech" }
            }"#,
        )?;

        let profile = load_profile(dir.path())?.context("profile should load")?;

        assert_eq!(
            profile.candidate.background(),
            "Staff Engineer at Acme. Skills: Rust, Postgres"
        );
        assert_eq!(profile.job.map(|j| j.company), Some("Initech".to_string()));
        Ok(())
    }

    #[test]
    fn malformed_profile_is_reported() -> Result<()> {
        let dir = tempdir()?;
        fs::write(dir.path().join(PROFILE_FILE), "{ not json")?;
        assert!(load_profile(dir.path()).is_err());
        Ok(())
    }
}
