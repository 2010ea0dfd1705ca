//! Requirements installer collaborator
//!
//! Installing the software's Python requirements happens elsewhere. The
//! install workflow hands over the derived settings and the requirement list
//! and only cares about success or failure.

use crate::core::error::Result;
use crate::core::output;
use std::path::PathBuf;

/// Everything the requirements installer receives
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequirementsRequest {
    /// Recipe instance name
    pub recipe: String,
    /// Comma separated addons path, main software addons first
    pub addons_path: String,
    /// Paths to add to the interpreter's search path
    pub extra_paths: Vec<PathBuf>,
    /// Recipe `eggs` followed by the manifest's requirements
    pub requirements: Vec<String>,
}

pub trait RequirementsInstaller {
    fn install(&self, request: &RequirementsRequest) -> Result<()>;
}

/// Prints what would be installed
#[derive(Debug, Clone, Copy, Default)]
pub struct ReportOnly;

impl RequirementsInstaller for ReportOnly {
    fn install(&self, request: &RequirementsRequest) -> Result<()> {
        output::sub_action("requirements");
        output::field("addons_path", &request.addons_path);
        for path in &request.extra_paths {
            output::field("extra path", &path.display().to_string());
        }
        if request.requirements.is_empty() {
            output::detail("no requirements declared");
        }
        for requirement in &request.requirements {
            output::field("requires", requirement);
        }
        Ok(())
    }
}
