//! Full profile analysis: ask each profile agent about a person, one at a
//! time, then merge what came back.

use std::time::Duration;

use hushh_core::{
    AgentOutcome, MergePriority, ProfileSummary, ResolvedProfile, merge_outcomes,
};
use serde::Serialize;
use thiserror::Error;
use tracing::info;

use crate::dispatcher::{BatchCall, BatchProgress, Dispatcher};
use crate::payload::{jsonrpc_text, new_session_id};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AnalysisError {
    #[error("provide at least a name, email or phone number")]
    EmptyQuery,
    #[error("no analysis agents configured")]
    NoAgents,
}

/// Who to look up
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProfileQuery {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

impl ProfileQuery {
    fn identifiers(&self) -> Vec<(&'static str, &str)> {
        [("Name", &self.name), ("Email", &self.email), ("Phone", &self.phone)]
            .into_iter()
            .filter_map(|(label, v)| {
                v.as_deref()
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(|s| (label, s))
            })
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.identifiers().is_empty()
    }

    /// The prompt every analysis agent receives
    pub fn prompt(&self) -> String {
        let mut prompt = String::from(
            "Find everything you can about the person below. Respond with only a JSON object \
             whose \"userProfile\" key holds their attributes (name, email, phone, age, gender, \
             city, state, country, occupation, company, education, income, interests, brands).\n",
        );
        for (label, value) in self.identifiers() {
            prompt.push_str(&format!("{}: {}\n", label, value));
        }
        prompt
    }
}

/// Which agents to ask, how to pace them and how to merge them
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisPlan {
    /// Dispatch order
    pub agents: Vec<String>,
    pub step_delay: Duration,
    pub priority: MergePriority,
}

impl Default for AnalysisPlan {
    fn default() -> Self {
        let priority = MergePriority::default();
        Self {
            agents: priority.0.clone(),
            step_delay: Duration::from_millis(600),
            priority,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProfileReport {
    pub outcomes: Vec<AgentOutcome>,
    pub profile: ResolvedProfile,
    pub summary: ProfileSummary,
}

impl ProfileReport {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.success).count()
    }
}

pub async fn analyze_profile<F>(
    dispatcher: &Dispatcher,
    query: &ProfileQuery,
    plan: &AnalysisPlan,
    progress: F,
) -> Result<ProfileReport, AnalysisError>
where
    F: FnMut(&BatchProgress),
{
    if query.is_empty() {
        return Err(AnalysisError::EmptyQuery);
    }
    if plan.agents.is_empty() {
        return Err(AnalysisError::NoAgents);
    }

    let session_id = new_session_id();
    let prompt = query.prompt();
    let calls: Vec<BatchCall> = plan
        .agents
        .iter()
        .map(|agent_id| {
            let envelope = jsonrpc_text(&prompt, Some(&session_id), None);
            BatchCall::new(agent_id.clone(), envelope.to_value())
        })
        .collect();

    info!("Profile analysis {} across {} agents", session_id, calls.len());
    let outcomes = dispatcher.dispatch_batch(&calls, plan.step_delay, progress).await;

    let profile = merge_outcomes(&plan.priority, &outcomes);
    let summary = ProfileSummary::from_profile(&profile);
    info!(
        "Profile analysis {} merged {} fields from {:?}",
        session_id,
        profile.fields.len(),
        profile.contributors
    );

    Ok(ProfileReport { outcomes, profile, summary })
}
