//! Accessibility audit over a serialized DOM
//!
//! Runs the sentinel's internal accessibility checks against a DOM snapshot:
//! - images missing alt text
//! - form inputs lacking any label association
//! - interactive controls with no accessible name
//! - missing heading structure
//!
//! Used by the page health scorer for score deductions and by the evidence
//! collector for the accessibility evidence file.

use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};

/// Severity of an accessibility issue, weighted in the health score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueSeverity {
    High,
    Medium,
    Low,
}

impl IssueSeverity {
    /// Score deduction per occurrence.
    pub fn weight(&self) -> u32 {
        match self {
            IssueSeverity::High => 10,
            IssueSeverity::Medium => 5,
            IssueSeverity::Low => 2,
        }
    }
}

/// One category of accessibility findings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessibilityIssue {
    pub description: String,
    pub severity: IssueSeverity,
    /// Number of offending elements.
    pub count: usize,
}

impl AccessibilityIssue {
    /// Total deduction this issue contributes to a health score.
    pub fn deduction(&self) -> u32 {
        self.severity.weight() * self.count as u32
    }
}

fn sel(selector: &str) -> Selector {
    Selector::parse(selector).expect("static selector")
}

/// Whether a form input has any label association: an explicit `label[for]`,
/// a wrapping `<label>`, or an ARIA label attribute.
fn has_label_association(input: ElementRef<'_>, labeled_ids: &[String]) -> bool {
    let value = input.value();
    if value.attr("aria-label").is_some() || value.attr("aria-labelledby").is_some() {
        return true;
    }
    if let Some(id) = value.attr("id") {
        if labeled_ids.iter().any(|l| l == id) {
            return true;
        }
    }
    input
        .ancestors()
        .filter_map(ElementRef::wrap)
        .any(|a| a.value().name() == "label")
}

/// Whether an interactive control exposes an accessible name: visible text,
/// an ARIA label, or a title attribute.
fn has_accessible_name(control: ElementRef<'_>) -> bool {
    let value = control.value();
    if value.attr("aria-label").is_some()
        || value.attr("aria-labelledby").is_some()
        || value.attr("title").is_some()
    {
        return true;
    }
    control.text().any(|t| !t.trim().is_empty())
}

/// Run all accessibility checks against a serialized DOM.
pub fn audit_dom(html: &str) -> Vec<AccessibilityIssue> {
    let document = Html::parse_document(html);
    let mut issues = Vec::new();

    // Images missing alt text.
    let missing_alt = document
        .select(&sel("img"))
        .filter(|img| img.value().attr("alt").is_none())
        .count();
    if missing_alt > 0 {
        issues.push(AccessibilityIssue {
            description: "images missing alt text".to_string(),
            severity: IssueSeverity::Medium,
            count: missing_alt,
        });
    }

    // Form inputs lacking any label association.
    let labeled_ids: Vec<String> = document
        .select(&sel("label[for]"))
        .filter_map(|l| l.value().attr("for").map(str::to_string))
        .collect();
    let unlabeled = document
        .select(&sel("input, select, textarea"))
        .filter(|el| el.value().attr("type") != Some("hidden"))
        .filter(|el| !has_label_association(*el, &labeled_ids))
        .count();
    if unlabeled > 0 {
        issues.push(AccessibilityIssue {
            description: "form inputs without label association".to_string(),
            severity: IssueSeverity::High,
            count: unlabeled,
        });
    }

    // Interactive controls with no accessible name.
    let unnamed = document
        .select(&sel("button, a[href]"))
        .filter(|el| !has_accessible_name(*el))
        .count();
    if unnamed > 0 {
        issues.push(AccessibilityIssue {
            description: "interactive controls without accessible name".to_string(),
            severity: IssueSeverity::High,
            count: unnamed,
        });
    }

    // Heading structure.
    let heading_count = document.select(&sel("h1, h2, h3, h4, h5, h6")).count();
    if heading_count == 0 {
        issues.push(AccessibilityIssue {
            description: "page has no headings".to_string(),
            severity: IssueSeverity::Medium,
            count: 1,
        });
    }
    let h1_count = document.select(&sel("h1")).count();
    if h1_count != 1 {
        issues.push(AccessibilityIssue {
            description: if h1_count == 0 {
                "page has no h1".to_string()
            } else {
                format!("page has {h1_count} h1 elements, expected exactly one")
            },
            severity: IssueSeverity::Low,
            count: 1,
        });
    }

    issues
}

/// Sum of score deductions across all issues.
pub fn total_deduction(issues: &[AccessibilityIssue]) -> u32 {
    issues.iter().map(AccessibilityIssue::deduction).sum()
}
