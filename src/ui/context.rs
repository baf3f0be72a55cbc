//! Output context detection

use std::io::IsTerminal;

/// Environment variables set by common CI providers
const CI_VARS: &[&str] = &[
    "CI",
    "GITHUB_ACTIONS",
    "GITLAB_CI",
    "BUILDKITE",
    "TF_BUILD",
];

/// Whether to decorate output for a human at a terminal
#[derive(Debug, Clone, Copy)]
pub struct UiContext {
    fancy: bool,
}

impl UiContext {
    /// Detect from stdout and the CI environment
    pub fn detect() -> Self {
        let in_ci = CI_VARS.iter().any(|var| std::env::var_os(var).is_some());
        Self {
            fancy: std::io::stdout().is_terminal() && !in_ci,
        }
    }

    /// Plain output (CI logs, tests)
    pub fn plain() -> Self {
        Self { fancy: false }
    }

    pub fn use_fancy_output(&self) -> bool {
        self.fancy
    }
}
