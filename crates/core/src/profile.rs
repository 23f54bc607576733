//! Resume and job data the interviewer and the coach draw on.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CandidateProfile {
    pub summary: String,
    pub skills: Vec<String>,
    pub experience: Vec<Experience>,
    pub education: Vec<Education>,
    pub contact: Option<Contact>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Experience {
    pub company: String,
    pub role: String,
    pub start_date: String,
    pub end_date: Option<String>,
    pub duration: String,
    pub location: String,
    pub description: String,
    pub keywords: Vec<String>,
    pub is_current_role: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Education {
    pub institution: String,
    pub degree: String,
    pub field: String,
    pub year: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Contact {
    pub email: String,
    pub phone: String,
    pub location: String,
    pub linkedin: String,
    pub github: String,
    pub website: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct JobDescription {
    pub position: String,
    pub company: String,
    pub location: String,
    pub about: String,
    pub description: String,
    pub requirements: Vec<String>,
    pub responsibilities: Vec<String>,
}

/// Everything loaded from `resume.json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterviewProfile {
    pub candidate: CandidateProfile,
    pub job: Option<JobDescription>,
}

impl CandidateProfile {
    /// One-line background used in coaching prompts: "<role> at <company>, ...".
    pub fn background(&self) -> String {
        let roles = self
            .experience
            .iter()
            .map(|e| format!("{} at {}", e.role, e.company))
            .collect::<Vec<_>>()
            .join(", ");
        match (roles.is_empty(), self.skills.is_empty()) {
            (true, true) => self.summary.clone(),
            (false, true) => roles,
            (true, false) => format!("Skills: {}", self.skills.join(", ")),
            (false, false) => format!("{}. Skills: {}", roles, self.skills.join(", ")),
        }
    }
}

impl InterviewProfile {
    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Text block appended to interviewer instructions.
    pub fn briefing(&self) -> String {
        let mut out = format!("Candidate: {}\n", self.candidate.background());
        if !self.candidate.summary.is_empty() {
            out.push_str(&format!("Summary: {}\n", self.candidate.summary));
        }
        if let Some(job) = &self.job {
            out.push_str(&format!("Position: {} at {}\n", job.position, job.company));
            if !job.requirements.is_empty() {
                out.push_str(&format!("Requirements: {}\n", job.requirements.join("; ")));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn background_lists_roles_then_skills() {
        let profile = InterviewProfile::from_json(
            r#"{
                "candidate": {
                    "summary": "Backend engineer",
                    "skills": ["Rust", "Postgres"],
                    "experience": [
                        {"company": "Acme", "role": "Staff Engineer", "isCurrentRole": true},
                        {"company": "Initech", "role": "Engineer"}
                    ]
                },
                "job": {"position": "Platform Lead", "company": "Globex", "requirements": ["Rust"]}
            }"#,
        )
        .unwrap();
        assert_eq!(
            profile.candidate.background(),
            "Staff Engineer at Acme, Engineer at Initech. Skills: Rust, Postgres"
        );
        assert!(profile.briefing().contains("Position: Platform Lead at Globex"));
    }

    #[test]
    fn summary_is_the_fallback_background() {
        let profile = CandidateProfile {
            summary: "New grad".to_string(),
            ..Default::default()
        };
        assert_eq!(profile.background(), "New grad");
    }
}
