//! Canonical subject builder.
//!
//! Pure and total: same inputs always produce the same string, absent
//! fields fall back to generic placeholders. The idempotent-update check in
//! the engine compares against exactly this output, so the fallback order
//! (org name, person name, deal title, `"Deal"`) and the `", "` crew join
//! are part of the contract.

use crate::store::Deal;

/// Build the canonical subject for an activity on `deal`.
///
/// Format: `[JOB <id>] <deal ref> — <type label>` with a
/// ` — Crew: <names>` suffix only when the crew list is non-empty.
pub fn build(deal: &Deal, type_label: &str, crew_names: &[String]) -> String {
    let deal_ref = [&deal.org_name, &deal.person_name, &deal.title]
        .into_iter()
        .filter_map(|field| field.as_deref())
        .map(str::trim)
        .find(|s| !s.is_empty())
        .unwrap_or("Deal");

    let label = {
        let trimmed = type_label.trim();
        if trimmed.is_empty() {
            "Activity"
        } else {
            trimmed
        }
    };

    let mut subject = format!("[JOB {}] {} — {}", deal.id, deal_ref, label);
    if !crew_names.is_empty() {
        subject.push_str(" — Crew: ");
        subject.push_str(&crew_names.join(", "));
    }
    subject
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deal(id: i64) -> Deal {
        Deal {
            id,
            title: None,
            org_name: None,
            person_name: None,
            crew_field: None,
            update_time: None,
        }
    }

    #[test]
    fn smith_job_scenario() {
        let mut d = deal(5);
        d.title = Some("Smith Job".to_string());
        let subject = build(&d, "Demo", &["Hector".to_string()]);
        assert_eq!(subject, "[JOB 5] Smith Job — Demo — Crew: Hector");
    }

    #[test]
    fn deterministic() {
        let mut d = deal(7);
        d.title = Some("Roof Repair".to_string());
        let crew = vec!["Kings".to_string(), "Kim".to_string()];
        assert_eq!(build(&d, "Call", &crew), build(&d, "Call", &crew));
    }

    #[test]
    fn deal_ref_fallback_order() {
        let mut d = deal(1);
        d.title = Some("Title".to_string());
        d.person_name = Some("Pat Smith".to_string());
        d.org_name = Some("Acme Restoration".to_string());
        assert!(build(&d, "Demo", &[]).contains("Acme Restoration"));

        d.org_name = None;
        assert!(build(&d, "Demo", &[]).contains("Pat Smith"));

        d.person_name = None;
        assert!(build(&d, "Demo", &[]).contains("Title"));

        d.title = None;
        assert_eq!(build(&d, "Demo", &[]), "[JOB 1] Deal — Demo");
    }

    #[test]
    fn blank_fields_are_skipped() {
        let mut d = deal(2);
        d.org_name = Some("   ".to_string());
        d.title = Some("Flood Cleanup".to_string());
        assert!(build(&d, "Demo", &[]).contains("Flood Cleanup"));
    }

    #[test]
    fn empty_type_label_falls_back() {
        let mut d = deal(3);
        d.title = Some("Job".to_string());
        assert_eq!(build(&d, "  ", &[]), "[JOB 3] Job — Activity");
    }

    #[test]
    fn crew_suffix_only_when_non_empty() {
        let mut d = deal(4);
        d.title = Some("Job".to_string());
        assert!(!build(&d, "Demo", &[]).contains("Crew:"));
        let crew = vec!["Hector".to_string(), "Kings".to_string()];
        assert!(build(&d, "Demo", &crew).ends_with("Crew: Hector, Kings"));
    }
}
