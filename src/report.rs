//! Summary of one pipeline run, printed by the CLI.

use std::fmt;

use serde::Serialize;

use crate::error::AnnopackError;
use crate::ir::ParseStats;

/// Output format for [`RunReport`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum ReportFormat {
    #[default]
    Text,
    Json,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RunReport {
    pub source: String,
    pub parse: ParseStats,
    /// Images whose pixels were loaded.
    pub images_loaded: usize,
    /// Units derived by the crop stage, if one was configured.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crops: Option<usize>,
    pub packaged: usize,
    pub labels: usize,
}

impl RunReport {
    pub fn render(&self, format: ReportFormat) -> Result<String, AnnopackError> {
        match format {
            ReportFormat::Text => Ok(self.to_string()),
            ReportFormat::Json => Ok(serde_json::to_string_pretty(self)?),
        }
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Source: {}", self.source)?;
        writeln!(f, "  records read:    {}", self.parse.records)?;
        writeln!(f, "  images:          {}", self.parse.images)?;
        writeln!(f, "  units emitted:   {}", self.parse.units_emitted)?;
        writeln!(
            f,
            "  boxes:           {} kept, {} rejected",
            self.parse.boxes_accepted, self.parse.boxes_rejected
        )?;
        writeln!(f, "  images loaded:   {}", self.images_loaded)?;
        if let Some(crops) = self.crops {
            writeln!(f, "  crops:           {crops}")?;
        }
        writeln!(f, "  packaged:        {}", self.packaged)?;
        write!(f, "  labels:          {}", self.labels)
    }
}
