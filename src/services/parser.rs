//! Parsing of upstream payloads into domain models.
//!
//! Handles both the snake_case discovery JSON and the camelCase GraphQL
//! detail node, plus the HTML scraping needed for the creator join date.

use regex::Regex;
use scraper::{Html, Selector};
use serde_json::Value;

use crate::error::{AppError, Result};
use crate::models::{
    Category, Creator, Faq, Location, Project, ProjectDetail, ProjectState, RewardTier,
};

fn str_of(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(|v| v.as_str()).map(String::from)
}

fn i64_of(value: &Value, key: &str) -> Option<i64> {
    value.get(key).and_then(|v| v.as_i64())
}

/// Numeric field that the API sometimes serializes as a string
/// (`"usd_pledged": "75000.0"`).
fn f64_of(value: &Value, key: &str) -> Option<f64> {
    match value.get(key) {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.parse().ok(),
        _ => None,
    }
}

fn bool_of(value: &Value, key: &str) -> bool {
    value.get(key).and_then(|v| v.as_bool()).unwrap_or(false)
}

/// Parse a project from a discovery result object.
///
/// Records missing the id or name are rejected; everything else degrades to
/// `None`/defaults.
pub fn parse_project(data: &Value) -> Result<Project> {
    let id = data
        .get("id")
        .and_then(|v| v.as_u64())
        .ok_or_else(|| AppError::validation("discovery record without id"))?;
    let name = str_of(data, "name")
        .ok_or_else(|| AppError::validation(format!("discovery record {id} without name")))?;

    let category = data.get("category").map(|cat| Category {
        name: str_of(cat, "name"),
        slug: str_of(cat, "slug"),
        parent: str_of(cat, "parent_name"),
    });

    let state = data
        .get("state")
        .cloned()
        .map(serde_json::from_value::<ProjectState>)
        .transpose()?
        .unwrap_or(ProjectState::Unknown);

    // Video is a dict with quality variants when present
    let video = data.get("video").filter(|v| v.is_object());
    let video_url = video.and_then(|v| str_of(v, "high").or_else(|| str_of(v, "base")));

    let photo = data.get("photo");
    let image_url = photo.and_then(|p| {
        str_of(p, "full")
            .or_else(|| str_of(p, "med"))
            .or_else(|| str_of(p, "1024x576"))
    });

    Ok(Project {
        id,
        slug: str_of(data, "slug"),
        name,
        blurb: str_of(data, "blurb"),
        url: data
            .pointer("/urls/web/project")
            .and_then(|v| v.as_str())
            .map(String::from),
        country: str_of(data, "country"),
        category,
        backers_count: i64_of(data, "backers_count").unwrap_or(0),
        goal: f64_of(data, "goal").unwrap_or(0.0),
        pledged: f64_of(data, "pledged").unwrap_or(0.0),
        currency: str_of(data, "currency"),
        usd_pledged: f64_of(data, "usd_pledged")
            .or_else(|| f64_of(data, "converted_pledged_amount")),
        fx_rate: f64_of(data, "fx_rate"),
        state,
        launched_at: i64_of(data, "launched_at"),
        deadline: i64_of(data, "deadline"),
        created_at: i64_of(data, "created_at"),
        state_changed_at: i64_of(data, "state_changed_at"),
        location: data.get("location").map(parse_discovery_location),
        comments_count: i64_of(data, "comments_count"),
        updates_count: i64_of(data, "updates_count"),
        watches_count: i64_of(data, "watches_count"),
        is_staff_pick: bool_of(data, "staff_pick"),
        is_project_we_love: bool_of(data, "is_project_we_love"),
        spotlight: bool_of(data, "spotlight"),
        has_video: video.is_some(),
        video_url,
        image_url,
    })
}

/// Discovery payload: `displayable_name` plus a `name` that is the city.
fn parse_discovery_location(data: &Value) -> Location {
    Location {
        name: str_of(data, "displayable_name").or_else(|| str_of(data, "name")),
        city: str_of(data, "name"),
        state: str_of(data, "state"),
        country: str_of(data, "country"),
        country_name: str_of(data, "expanded_country"),
    }
}

/// GraphQL payload: `displayableName`/`countryName` variants.
fn parse_graphql_location(data: &Value) -> Location {
    Location {
        name: str_of(data, "displayableName").or_else(|| str_of(data, "name")),
        city: str_of(data, "name"),
        state: str_of(data, "state"),
        country: str_of(data, "country"),
        country_name: str_of(data, "countryName"),
    }
}

/// Parse the GraphQL project node into a detail record.
///
/// The creator join date is not part of the structured query; it is filled in
/// afterwards from the profile page.
pub fn parse_detail(id: u64, slug: Option<String>, node: &Value) -> ProjectDetail {
    let story_text = node
        .get("story")
        .and_then(|s| s.as_str())
        .map(html_to_text)
        .unwrap_or_default();

    let risks = node
        .get("risks")
        .and_then(|r| r.as_str())
        .map(split_risk_blocks)
        .unwrap_or_default();

    let faqs = node
        .pointer("/faqs/nodes")
        .and_then(|n| n.as_array())
        .map(|nodes| {
            nodes
                .iter()
                .filter_map(|f| {
                    Some(Faq {
                        question: str_of(f, "question")?,
                        answer: str_of(f, "answer").unwrap_or_default(),
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    let rewards = node
        .pointer("/rewards/nodes")
        .and_then(|n| n.as_array())
        .map(|nodes| nodes.iter().map(parse_reward).collect())
        .unwrap_or_default();

    let creator = node
        .get("creator")
        .filter(|c| c.is_object())
        .map(parse_creator);

    ProjectDetail {
        id,
        slug,
        creator,
        story_text,
        risks,
        faqs,
        rewards,
    }
}

fn parse_creator(data: &Value) -> Creator {
    let websites = data
        .get("websites")
        .and_then(|w| w.as_array())
        .map(|sites| sites.iter().filter_map(|s| str_of(s, "url")).collect())
        .unwrap_or_default();

    Creator {
        id: str_of(data, "id"),
        name: str_of(data, "name"),
        slug: str_of(data, "slug"),
        url: str_of(data, "url"),
        biography: str_of(data, "biography"),
        websites,
        backed_count: i64_of(data, "backingsCount"),
        projects_count: data
            .pointer("/launchedProjects/totalCount")
            .and_then(|v| v.as_i64()),
        joined_at: None,
        location: data
            .get("location")
            .filter(|l| l.is_object())
            .map(parse_graphql_location),
    }
}

fn parse_reward(data: &Value) -> RewardTier {
    let limit = data.get("limit").and_then(|v| v.as_i64());
    RewardTier {
        title: str_of(data, "name"),
        description: str_of(data, "description"),
        amount: data.get("amount").and_then(|a| f64_of(a, "amount")),
        currency: data
            .get("amount")
            .and_then(|a| str_of(a, "currency")),
        backers_count: i64_of(data, "backersCount").unwrap_or(0),
        estimated_delivery: str_of(data, "estimatedDeliveryOn"),
        is_limited: limit.is_some(),
        limit,
    }
}

/// Strip markup and collapse whitespace.
pub fn html_to_text(html: &str) -> String {
    let fragment = Html::parse_fragment(html);
    let text: Vec<&str> = fragment.root_element().text().collect();
    text.join(" ").split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Split risks-and-challenges text into ordered paragraph blocks.
pub fn split_risk_blocks(text: &str) -> Vec<String> {
    text.split('\n')
        .map(str::trim)
        .filter(|block| !block.is_empty())
        .map(String::from)
        .collect()
}

/// Scrape the creator join date from their profile page HTML.
///
/// The date appears as `<meta property="joined" content="YYYY-MM-DD ...">`,
/// or as a `<time datetime="...">` near a "Joined" label on older layouts.
pub fn extract_joined_at(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let meta_sel = Selector::parse(r#"meta[property="joined"]"#).ok()?;

    let raw = document
        .select(&meta_sel)
        .find_map(|el| el.value().attr("content").map(String::from))
        .or_else(|| {
            let re = Regex::new(r#"(?s)Joined.*?<time\s+datetime="([^"]+)""#).ok()?;
            re.captures(html).map(|c| c[1].to_string())
        })?;

    let date_re = Regex::new(r"^\d{4}-\d{2}-\d{2}").ok()?;
    match date_re.find(raw.trim()) {
        Some(m) => Some(m.as_str().to_string()),
        None => Some(raw.trim().to_string()),
    }
}
