//! Merge/export engine.
//!
//! Joins the discovery and detail stores by project id into one wide row per
//! discovered project, recomputes every derived field, flattens nested
//! substructures, and writes the result as CSV and as an Arrow IPC file.
//!
//! The whole engine is a pure function of the two record sets: identical
//! inputs produce byte-identical outputs. Both encodings are driven by the
//! same column table, so their logical schemas cannot drift apart.

use std::collections::HashMap;
use std::fs::{self, File};
use std::path::Path;
use std::sync::Arc;

use arrow::array::{
    ArrayRef, BooleanBuilder, Float64Builder, Int64Builder, StringBuilder,
};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use arrow_ipc::writer::FileWriter;
use chrono::DateTime;

use crate::error::{AppError, Result};
use crate::models::{Faq, Project, ProjectDetail, RewardTier};
use crate::relevance::RelevanceScorer;

/// One fully-merged, flattened export row.
///
/// Detail-only fields are `None` when the project has no detail record yet;
/// the row is still emitted (discovery is the authoritative row set).
#[derive(Debug, Clone, PartialEq)]
pub struct ExportRow {
    pub id: i64,
    pub slug: Option<String>,
    pub name: String,
    pub blurb: Option<String>,
    pub url: Option<String>,
    pub country: Option<String>,
    pub category_name: Option<String>,
    pub category_slug: Option<String>,
    pub category_parent: Option<String>,
    pub backers_count: i64,
    pub goal: f64,
    pub pledged: f64,
    pub currency: Option<String>,
    pub usd_pledged: Option<f64>,
    pub fx_rate: Option<f64>,
    pub percent_funded: f64,
    pub state: String,
    pub launched_at: Option<String>,
    pub deadline: Option<String>,
    pub created_at: Option<String>,
    pub state_changed_at: Option<String>,
    pub duration: Option<i64>,
    pub location_name: Option<String>,
    pub location_city: Option<String>,
    pub location_state: Option<String>,
    pub location_country: Option<String>,
    pub location_country_name: Option<String>,
    pub comments_count: Option<i64>,
    pub updates_count: Option<i64>,
    pub watches_count: Option<i64>,
    pub is_staff_pick: bool,
    pub is_project_we_love: bool,
    pub spotlight: bool,
    pub has_video: bool,
    pub video_url: Option<String>,
    pub image_url: Option<String>,
    pub creator_id: Option<String>,
    pub creator_name: Option<String>,
    pub creator_slug: Option<String>,
    pub creator_url: Option<String>,
    pub creator_biography: Option<String>,
    pub creator_websites: Option<String>,
    pub creator_backed_count: Option<i64>,
    pub creator_projects_count: Option<i64>,
    pub creator_joined_at: Option<String>,
    pub creator_location_name: Option<String>,
    pub creator_location_city: Option<String>,
    pub creator_location_state: Option<String>,
    pub creator_location_country: Option<String>,
    pub creator_location_country_name: Option<String>,
    pub campaign_story_text: Option<String>,
    pub campaign_word_count: Option<i64>,
    pub campaign_ai_mentions: Option<i64>,
    pub risks: Option<String>,
    pub faq_count: Option<i64>,
    pub faqs: Option<String>,
    pub reward_count: Option<i64>,
    pub rewards: Option<String>,
}

// --- Derived fields ---
// Always recomputed here, never trusted from a stored snapshot, so a
// corrected formula retroactively fixes all exports without re-scraping.

/// pledged/goal as a percentage; 0 when the goal is unset or non-positive.
pub fn percent_funded(goal: f64, pledged: f64) -> f64 {
    if goal > 0.0 { pledged / goal * 100.0 } else { 0.0 }
}

/// Campaign length in whole days.
pub fn duration_days(launched_at: Option<i64>, deadline: Option<i64>) -> Option<i64> {
    match (launched_at, deadline) {
        (Some(launched), Some(deadline)) => Some((deadline - launched) / 86_400),
        _ => None,
    }
}

pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Unix seconds to ISO-8601 UTC, `None` for out-of-range values.
fn format_timestamp(ts: Option<i64>) -> Option<String> {
    let ts = ts?;
    DateTime::from_timestamp(ts, 0).map(|dt| dt.format("%Y-%m-%dT%H:%M:%SZ").to_string())
}

// --- Flattening rules ---

fn flatten_websites(websites: &[String]) -> Option<String> {
    if websites.is_empty() {
        None
    } else {
        Some(websites.join("; "))
    }
}

fn flatten_risks(risks: &[String]) -> Option<String> {
    if risks.is_empty() {
        None
    } else {
        Some(risks.join("\n\n"))
    }
}

fn flatten_faqs(faqs: &[Faq]) -> Option<String> {
    if faqs.is_empty() {
        return None;
    }
    let entries: Vec<String> = faqs
        .iter()
        .map(|f| format!("Q: {} A: {}", f.question, f.answer))
        .collect();
    Some(entries.join(" | "))
}

fn flatten_rewards(rewards: &[RewardTier]) -> Option<String> {
    if rewards.is_empty() {
        return None;
    }
    let entries: Vec<String> = rewards.iter().map(reward_entry).collect();
    Some(entries.join(" | "))
}

fn reward_entry(r: &RewardTier) -> String {
    let title = r.title.as_deref().unwrap_or("");
    let amount = match (r.amount, r.currency.as_deref()) {
        (Some(amount), Some(currency)) => format!("{amount} {currency}"),
        (Some(amount), None) => amount.to_string(),
        _ => "?".to_string(),
    };
    let delivery = r.estimated_delivery.as_deref().unwrap_or("-");
    format!(
        "{title} [{amount}] backers={} delivery={delivery}",
        r.backers_count
    )
}

impl ExportRow {
    /// Merge one project with its (optional) detail record.
    pub fn build(
        project: &Project,
        detail: Option<&ProjectDetail>,
        scorer: &RelevanceScorer,
    ) -> Result<Self> {
        let id = i64::try_from(project.id).map_err(|_| {
            AppError::validation(format!("project id {} exceeds the export range", project.id))
        })?;
        let category = project.category.as_ref();
        let location = project.location.as_ref();
        let creator = detail.and_then(|d| d.creator.as_ref());
        let creator_location = creator.and_then(|c| c.location.as_ref());

        Ok(Self {
            id,
            slug: project.slug.clone(),
            name: project.name.clone(),
            blurb: project.blurb.clone(),
            url: project.url.clone(),
            country: project.country.clone(),
            category_name: category.and_then(|c| c.name.clone()),
            category_slug: category.and_then(|c| c.slug.clone()),
            category_parent: category.and_then(|c| c.parent.clone()),
            backers_count: project.backers_count,
            goal: project.goal,
            pledged: project.pledged,
            currency: project.currency.clone(),
            usd_pledged: project.usd_pledged,
            fx_rate: project.fx_rate,
            percent_funded: percent_funded(project.goal, project.pledged),
            state: project.state.as_str().to_string(),
            launched_at: format_timestamp(project.launched_at),
            deadline: format_timestamp(project.deadline),
            created_at: format_timestamp(project.created_at),
            state_changed_at: format_timestamp(project.state_changed_at),
            duration: duration_days(project.launched_at, project.deadline),
            location_name: location.and_then(|l| l.name.clone()),
            location_city: location.and_then(|l| l.city.clone()),
            location_state: location.and_then(|l| l.state.clone()),
            location_country: location.and_then(|l| l.country.clone()),
            location_country_name: location.and_then(|l| l.country_name.clone()),
            comments_count: project.comments_count,
            updates_count: project.updates_count,
            watches_count: project.watches_count,
            is_staff_pick: project.is_staff_pick,
            is_project_we_love: project.is_project_we_love,
            spotlight: project.spotlight,
            has_video: project.has_video,
            video_url: project.video_url.clone(),
            image_url: project.image_url.clone(),
            creator_id: creator.and_then(|c| c.id.clone()),
            creator_name: creator.and_then(|c| c.name.clone()),
            creator_slug: creator.and_then(|c| c.slug.clone()),
            creator_url: creator.and_then(|c| c.url.clone()),
            creator_biography: creator.and_then(|c| c.biography.clone()),
            creator_websites: creator.and_then(|c| flatten_websites(&c.websites)),
            creator_backed_count: creator.and_then(|c| c.backed_count),
            creator_projects_count: creator.and_then(|c| c.projects_count),
            creator_joined_at: creator.and_then(|c| c.joined_at.clone()),
            creator_location_name: creator_location.and_then(|l| l.name.clone()),
            creator_location_city: creator_location.and_then(|l| l.city.clone()),
            creator_location_state: creator_location.and_then(|l| l.state.clone()),
            creator_location_country: creator_location.and_then(|l| l.country.clone()),
            creator_location_country_name: creator_location.and_then(|l| l.country_name.clone()),
            campaign_story_text: detail.map(|d| d.story_text.clone()),
            campaign_word_count: detail.map(|d| word_count(&d.story_text) as i64),
            campaign_ai_mentions: detail.map(|d| scorer.mentions(&d.story_text) as i64),
            risks: detail.and_then(|d| flatten_risks(&d.risks)),
            faq_count: detail.map(|d| d.faqs.len() as i64),
            faqs: detail.and_then(|d| flatten_faqs(&d.faqs)),
            reward_count: detail.map(|d| d.rewards.len() as i64),
            rewards: detail.and_then(|d| flatten_rewards(&d.rewards)),
        })
    }
}

/// Build the merged row set: one row per discovery project, in discovery
/// store order, with detail columns empty where no detail record exists.
/// Detail-only ids are ignored.
pub fn build_rows(
    projects: &[Project],
    details: &[ProjectDetail],
    scorer: &RelevanceScorer,
) -> Result<Vec<ExportRow>> {
    let by_id: HashMap<u64, &ProjectDetail> = details.iter().map(|d| (d.id, d)).collect();
    projects
        .iter()
        .map(|p| ExportRow::build(p, by_id.get(&p.id).copied(), scorer))
        .collect()
}

// --- Column table ---
// Single source of truth for name, type and value of every exported column;
// both encodings render from it.

enum ColValue {
    Str(fn(&ExportRow) -> Option<String>),
    Int(fn(&ExportRow) -> Option<i64>),
    Float(fn(&ExportRow) -> Option<f64>),
    Bool(fn(&ExportRow) -> bool),
}

/// The documented export schema, in fixed order.
const COLUMNS: [(&str, ColValue); 58] = [
    ("id", ColValue::Int(|r| Some(r.id))),
    ("slug", ColValue::Str(|r| r.slug.clone())),
    ("name", ColValue::Str(|r| Some(r.name.clone()))),
    ("blurb", ColValue::Str(|r| r.blurb.clone())),
    ("url", ColValue::Str(|r| r.url.clone())),
    ("country", ColValue::Str(|r| r.country.clone())),
    ("category_name", ColValue::Str(|r| r.category_name.clone())),
    ("category_slug", ColValue::Str(|r| r.category_slug.clone())),
    ("category_parent", ColValue::Str(|r| r.category_parent.clone())),
    ("backers_count", ColValue::Int(|r| Some(r.backers_count))),
    ("goal", ColValue::Float(|r| Some(r.goal))),
    ("pledged", ColValue::Float(|r| Some(r.pledged))),
    ("currency", ColValue::Str(|r| r.currency.clone())),
    ("usd_pledged", ColValue::Float(|r| r.usd_pledged)),
    ("fx_rate", ColValue::Float(|r| r.fx_rate)),
    ("percent_funded", ColValue::Float(|r| Some(r.percent_funded))),
    ("state", ColValue::Str(|r| Some(r.state.clone()))),
    ("launched_at", ColValue::Str(|r| r.launched_at.clone())),
    ("deadline", ColValue::Str(|r| r.deadline.clone())),
    ("created_at", ColValue::Str(|r| r.created_at.clone())),
    ("state_changed_at", ColValue::Str(|r| r.state_changed_at.clone())),
    ("duration", ColValue::Int(|r| r.duration)),
    ("location_name", ColValue::Str(|r| r.location_name.clone())),
    ("location_city", ColValue::Str(|r| r.location_city.clone())),
    ("location_state", ColValue::Str(|r| r.location_state.clone())),
    ("location_country", ColValue::Str(|r| r.location_country.clone())),
    ("location_country_name", ColValue::Str(|r| r.location_country_name.clone())),
    ("comments_count", ColValue::Int(|r| r.comments_count)),
    ("updates_count", ColValue::Int(|r| r.updates_count)),
    ("watches_count", ColValue::Int(|r| r.watches_count)),
    ("is_staff_pick", ColValue::Bool(|r| r.is_staff_pick)),
    ("is_project_we_love", ColValue::Bool(|r| r.is_project_we_love)),
    ("spotlight", ColValue::Bool(|r| r.spotlight)),
    ("has_video", ColValue::Bool(|r| r.has_video)),
    ("video_url", ColValue::Str(|r| r.video_url.clone())),
    ("image_url", ColValue::Str(|r| r.image_url.clone())),
    ("creator_id", ColValue::Str(|r| r.creator_id.clone())),
    ("creator_name", ColValue::Str(|r| r.creator_name.clone())),
    ("creator_slug", ColValue::Str(|r| r.creator_slug.clone())),
    ("creator_url", ColValue::Str(|r| r.creator_url.clone())),
    ("creator_biography", ColValue::Str(|r| r.creator_biography.clone())),
    ("creator_websites", ColValue::Str(|r| r.creator_websites.clone())),
    ("creator_backed_count", ColValue::Int(|r| r.creator_backed_count)),
    ("creator_projects_count", ColValue::Int(|r| r.creator_projects_count)),
    ("creator_joined_at", ColValue::Str(|r| r.creator_joined_at.clone())),
    ("creator_location_name", ColValue::Str(|r| r.creator_location_name.clone())),
    ("creator_location_city", ColValue::Str(|r| r.creator_location_city.clone())),
    ("creator_location_state", ColValue::Str(|r| r.creator_location_state.clone())),
    ("creator_location_country", ColValue::Str(|r| r.creator_location_country.clone())),
    ("creator_location_country_name", ColValue::Str(|r| r.creator_location_country_name.clone())),
    ("campaign_story_text", ColValue::Str(|r| r.campaign_story_text.clone())),
    ("campaign_word_count", ColValue::Int(|r| r.campaign_word_count)),
    ("campaign_ai_mentions", ColValue::Int(|r| r.campaign_ai_mentions)),
    ("risks", ColValue::Str(|r| r.risks.clone())),
    ("faq_count", ColValue::Int(|r| r.faq_count)),
    ("faqs", ColValue::Str(|r| r.faqs.clone())),
    ("reward_count", ColValue::Int(|r| r.reward_count)),
    ("rewards", ColValue::Str(|r| r.rewards.clone())),
];

/// Column names in export order.
pub fn column_names() -> Vec<&'static str> {
    COLUMNS.iter().map(|(name, _)| *name).collect()
}

/// Write rows as CSV with a header row.
pub fn write_csv(rows: &[ExportRow], path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut writer = csv::Writer::from_writer(File::create(path)?);
    writer.write_record(column_names())?;

    for row in rows {
        for (_, value) in &COLUMNS {
            let field = match value {
                ColValue::Str(get) => get(row).unwrap_or_default(),
                ColValue::Int(get) => get(row).map(|v| v.to_string()).unwrap_or_default(),
                ColValue::Float(get) => get(row).map(|v| v.to_string()).unwrap_or_default(),
                ColValue::Bool(get) => get(row).to_string(),
            };
            writer.write_field(field)?;
        }
        // Empty iterator terminates the record
        writer.write_record(None::<&[u8]>)?;
    }
    writer.flush()?;
    log::info!("Exported {} rows to CSV: {}", rows.len(), path.display());
    Ok(())
}

/// Write rows as an Arrow IPC file with the identical logical schema.
pub fn write_arrow(rows: &[ExportRow], path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let fields: Vec<Field> = COLUMNS
        .iter()
        .map(|(name, value)| match value {
            ColValue::Str(_) => Field::new(*name, DataType::Utf8, true),
            ColValue::Int(_) => Field::new(*name, DataType::Int64, true),
            ColValue::Float(_) => Field::new(*name, DataType::Float64, true),
            ColValue::Bool(_) => Field::new(*name, DataType::Boolean, false),
        })
        .collect();
    let schema = Arc::new(Schema::new(fields));

    let mut arrays: Vec<ArrayRef> = Vec::with_capacity(COLUMNS.len());
    for (_, value) in &COLUMNS {
        let array: ArrayRef = match value {
            ColValue::Str(get) => {
                let mut builder = StringBuilder::new();
                for row in rows {
                    builder.append_option(get(row));
                }
                Arc::new(builder.finish())
            }
            ColValue::Int(get) => {
                let mut builder = Int64Builder::new();
                for row in rows {
                    builder.append_option(get(row));
                }
                Arc::new(builder.finish())
            }
            ColValue::Float(get) => {
                let mut builder = Float64Builder::new();
                for row in rows {
                    builder.append_option(get(row));
                }
                Arc::new(builder.finish())
            }
            ColValue::Bool(get) => {
                let mut builder = BooleanBuilder::new();
                for row in rows {
                    builder.append_value(get(row));
                }
                Arc::new(builder.finish())
            }
        };
        arrays.push(array);
    }

    let batch = RecordBatch::try_new(Arc::clone(&schema), arrays)?;
    let file = File::create(path)?;
    let mut writer = FileWriter::try_new(file, &schema)?;
    writer.write(&batch)?;
    writer.finish()?;

    log::info!("Exported {} rows to Arrow: {}", rows.len(), path.display());
    Ok(())
}
