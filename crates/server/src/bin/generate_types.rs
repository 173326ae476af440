use std::{fs, path::PathBuf};

use server::routes::assistant::{AnalyticsSummaryRequest, PersonalityRequest, SpamCheckRequest};
use services::services::{
    assistant::{AnalyticsSummary, PersonalityUpdate, SpamVerdict},
    stats::DashboardStats,
};
use ts_rs::TS;
use utils::response::ApiResponse;

const DEFAULT_OUTPUT: &str = "shared/types.ts";

fn main() -> anyhow::Result<()> {
    let output = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT));

    let decls = [
        ApiResponse::<()>::decl(),
        DashboardStats::decl(),
        SpamCheckRequest::decl(),
        SpamVerdict::decl(),
        PersonalityRequest::decl(),
        PersonalityUpdate::decl(),
        AnalyticsSummaryRequest::decl(),
        AnalyticsSummary::decl(),
    ];

    let mut content = String::from("// This file was generated by `generate_types`. Do not edit.\n");
    for decl in decls {
        content.push_str("\nexport ");
        content.push_str(&decl);
        content.push('\n');
    }

    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(&output, content)?;
    println!("Wrote {}", output.display());
    Ok(())
}
