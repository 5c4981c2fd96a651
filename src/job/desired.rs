//! Desired Job state
//!
//! [`DesiredJobBuilder`] collects the mover profile, service account, extra
//! env and pause flag in any order and produces an immutable [`DesiredJob`].

use crate::config::MoverConfig;
use crate::error::{Error, Result};
use crate::mover::{env_value, DesiredTemplate, MoverProfile};

use super::RunGate;

/// Everything the reconciler needs to know about the Job it should converge to
#[derive(Clone, Debug, PartialEq)]
pub struct DesiredJob {
    mover: &'static str,
    template: DesiredTemplate,
    gate: RunGate,
}

impl DesiredJob {
    pub fn builder() -> DesiredJobBuilder {
        DesiredJobBuilder::default()
    }

    /// Name of the selected mover
    pub fn mover(&self) -> &'static str {
        self.mover
    }

    pub fn template(&self) -> &DesiredTemplate {
        &self.template
    }

    pub fn gate(&self) -> RunGate {
        self.gate
    }
}

/// Builder for [`DesiredJob`]
#[derive(Debug, Default)]
pub struct DesiredJobBuilder {
    profiles: Vec<MoverProfile>,
    service_account: Option<String>,
    extra_env: Vec<(String, String)>,
    paused: bool,
}

impl DesiredJobBuilder {
    /// Select the mover. Exactly one must be selected.
    pub fn profile(mut self, profile: MoverProfile) -> Self {
        self.profiles.push(profile);
        self
    }

    pub fn service_account(mut self, name: impl Into<String>) -> Self {
        self.service_account = Some(name.into());
        self
    }

    /// Add a plain env var to the mover container, after the mover's own
    pub fn env(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_env.push((name.into(), value.into()));
        self
    }

    pub fn paused(mut self, paused: bool) -> Self {
        self.paused = paused;
        self
    }

    /// Build the pod template for the selected mover and apply the extras
    pub fn build(self, config: &MoverConfig) -> Result<DesiredJob> {
        let mut profiles = self.profiles.into_iter();
        let profile = match (profiles.next(), profiles.next()) {
            (Some(profile), None) => profile,
            (None, _) => return Err(Error::validation("no mover profile selected")),
            (Some(first), Some(second)) => {
                return Err(Error::validation(format!(
                    "exactly one mover profile must be selected, got {} and {}",
                    first.name(),
                    second.name()
                )))
            }
        };

        let mut template = profile.build_template(config);
        if let Some(sa) = self.service_account {
            template.set_service_account_name(sa);
        }
        for (name, value) in &self.extra_env {
            template.push_env(env_value(name, value));
        }

        Ok(DesiredJob {
            mover: profile.name(),
            template,
            gate: RunGate::from_paused(self.paused),
        })
    }
}
