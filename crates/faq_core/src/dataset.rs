//! The canonical telecom FAQ dataset shared by the matcher and the UI.

use anyhow::{bail, Context, Result};
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::model::FaqRecord;

const BUILTIN_FAQS: &str = include_str!("../../../data/telecom_faqs.jsonl");

pub fn builtin_faqs() -> Result<Vec<FaqRecord>> {
    parse_faq_records(BUILTIN_FAQS.lines()).context("parse built-in telecom FAQs")
}

pub fn load_faq_jsonl(path: &Path) -> Result<Vec<FaqRecord>> {
    let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let lines = BufReader::new(file)
        .lines()
        .collect::<std::io::Result<Vec<_>>>()
        .context("read faq dataset line")?;
    parse_faq_records(lines.iter().map(String::as_str))
        .with_context(|| format!("parse {}", path.display()))
}

fn parse_faq_records<'a>(lines: impl Iterator<Item = &'a str>) -> Result<Vec<FaqRecord>> {
    let mut out = Vec::new();
    let mut seen = HashSet::new();

    for (lineno, line) in lines.enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let record: FaqRecord = serde_json::from_str(line)
            .with_context(|| format!("line {}: parse faq record json", lineno + 1))?;

        if record.question.trim().is_empty() || record.answer.trim().is_empty() {
            bail!("line {}: faq {} has a blank question or answer", lineno + 1, record.id);
        }
        if !seen.insert(record.id.clone()) {
            bail!("line {}: duplicate faq id {}", lineno + 1, record.id);
        }
        out.push(record);
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn builtin_dataset_has_all_faqs() {
        let records = builtin_faqs().unwrap();
        assert_eq!(records.len(), 19);
        assert_eq!(records[0].question, "How can I recharge my mobile balance?");
        assert_eq!(
            records[0].answer,
            "You can recharge via scratch card, mobile app, or USSD code *123#."
        );

        let featured: Vec<_> = records.iter().filter(|r| r.featured).collect();
        assert_eq!(featured.len(), 8);
        assert_eq!(featured[7].id, "slow-internet");
    }

    #[test]
    fn rejects_duplicate_ids() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"id":"a","question":"q1","answer":"a1"}}"#).unwrap();
        writeln!(file).unwrap();
        writeln!(file, r#"{{"id":"a","question":"q2","answer":"a2"}}"#).unwrap();

        let err = load_faq_jsonl(file.path()).unwrap_err();
        assert!(format!("{err:#}").contains("duplicate faq id a"));
    }

    #[test]
    fn rejects_blank_answers() {
        let err = parse_faq_records([r#"{"id":"x","question":"q","answer":"  "}"#].into_iter())
            .unwrap_err();
        assert!(err.to_string().contains("blank question or answer"));
    }

    #[test]
    fn featured_defaults_to_false() {
        let records =
            parse_faq_records([r#"{"id":"x","question":"q","answer":"a"}"#].into_iter()).unwrap();
        assert!(!records[0].featured);
    }
}
