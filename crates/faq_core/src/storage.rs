use crate::model::FaqEntry;
use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

/// Write a precomputed knowledge-base index, one entry per line.
pub fn save_index_jsonl(path: &Path, entries: &[FaqEntry]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create {}", parent.display()))?;
    }
    let file = File::create(path).with_context(|| format!("create {}", path.display()))?;
    let mut writer = BufWriter::new(file);

    for entry in entries {
        serde_json::to_writer(&mut writer, entry).context("serialize faq entry")?;
        writer.write_all(b"\n").context("write newline")?;
    }

    writer.flush().context("flush index")
}

pub fn load_index_jsonl(path: &Path) -> Result<Vec<FaqEntry>> {
    let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let reader = BufReader::new(file);
    let mut entries = Vec::new();

    for (lineno, line) in reader.lines().enumerate() {
        let line = line.context("read index line")?;
        if line.trim().is_empty() {
            continue;
        }
        let entry: FaqEntry = serde_json::from_str(&line)
            .with_context(|| format!("line {}: parse faq entry json", lineno + 1))?;
        entries.push(entry);
    }

    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::builtin_faqs;
    use crate::embed::HashEmbeddingProvider;
    use crate::knowledge::KnowledgeBase;

    #[test]
    fn saved_index_reloads_into_a_knowledge_base() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index/telecom.jsonl");
        let embedder = HashEmbeddingProvider::new(96);
        let kb = KnowledgeBase::embed_records(builtin_faqs().unwrap(), &embedder).unwrap();

        save_index_jsonl(&path, kb.entries()).unwrap();
        let loaded =
            KnowledgeBase::from_index(load_index_jsonl(&path).unwrap(), &embedder).unwrap();

        assert_eq!(loaded.len(), kb.len());
        let drift = loaded.entries()[5]
            .embedding
            .iter()
            .zip(&kb.entries()[5].embedding)
            .map(|(a, b)| (a - b).abs())
            .fold(0.0f32, f32::max);
        assert!(drift < 1e-6);
        assert_eq!(loaded.featured_questions(), kb.featured_questions());
    }

    #[test]
    fn bad_line_reports_its_position() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.jsonl");
        std::fs::write(&path, "\n{not json}\n").unwrap();

        let err = load_index_jsonl(&path).unwrap_err();
        assert!(format!("{err:#}").contains("line 2"));
    }
}
