//! Batch ingestion of plain-text support documents into a persistent vector
//! store backed by a Parquet file per collection.

use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use arrow::array::{Array, ArrayRef, AsArray, Float32Builder, ListBuilder, RecordBatch, StringArray};
use arrow::datatypes::{DataType, Field, Float32Type, Schema, SchemaRef};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use rayon::prelude::*;
use tracing::{info, warn};

use crate::embed::EmbeddingProvider;

pub const DEFAULT_COLLECTION: &str = "support_faqs";

#[derive(Debug, Clone, PartialEq)]
pub struct SourceDocument {
    pub id: String,
    pub text: String,
    pub source: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VectorRecord {
    pub id: String,
    pub document: String,
    pub source: String,
    pub embedding: Vec<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestReport {
    pub upserted: usize,
    pub collection_size: usize,
}

/// Sorted `*.txt` files of `dir`, trimmed. Empty files are skipped but still
/// consume their position, so `doc-{i}` ids stay stable per file name order.
pub fn collect_documents(dir: &Path) -> Result<Vec<SourceDocument>> {
    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_context(|| format!("read dir {}", dir.display()))?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<std::io::Result<_>>()
        .context("list documents")?;
    paths.retain(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "txt"));
    paths.sort();

    let mut docs = Vec::new();
    for (i, path) in paths.iter().enumerate() {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read {}", path.display()))?;
        let text = text.trim();
        if text.is_empty() {
            warn!(file = %path.display(), "skipping empty document");
            continue;
        }
        docs.push(SourceDocument {
            id: format!("doc-{i}"),
            text: text.to_string(),
            source: path
                .file_name()
                .map(|f| f.to_string_lossy().into_owned())
                .unwrap_or_default(),
        });
    }

    Ok(docs)
}

/// Embed every document under `dir` and upsert it into `store`. Returns
/// `None` when there was nothing to ingest; the store is left untouched.
pub fn ingest_directory(
    dir: &Path,
    store: &ParquetVectorStore,
    embedder: &dyn EmbeddingProvider,
) -> Result<Option<IngestReport>> {
    let docs = collect_documents(dir)?;
    if docs.is_empty() {
        warn!(dir = %dir.display(), "no .txt documents found");
        return Ok(None);
    }

    info!(documents = docs.len(), model = embedder.model_id(), "embedding documents");
    let records = docs
        .into_par_iter()
        .map(|doc| {
            let embedding = embedder
                .embed(&doc.text)
                .with_context(|| format!("embed {}", doc.source))?;
            Ok(VectorRecord {
                id: doc.id,
                document: doc.text,
                source: doc.source,
                embedding,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let upserted = records.len();
    let collection_size = store.upsert(records)?;
    info!(upserted, collection_size, path = %store.path().display(), "ingestion done");

    Ok(Some(IngestReport {
        upserted,
        collection_size,
    }))
}

/// One Parquet file per collection. Writes replace the whole file through a
/// temporary sibling and a rename.
#[derive(Debug, Clone)]
pub struct ParquetVectorStore {
    path: PathBuf,
}

impl ParquetVectorStore {
    pub fn open(dir: &Path, collection: &str) -> Result<Self> {
        if collection.is_empty() || collection.contains(['/', '\\']) {
            bail!("invalid collection name '{collection}'");
        }
        std::fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
        Ok(Self {
            path: dir.join(format!("{collection}.parquet")),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn schema() -> SchemaRef {
        Arc::new(Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            Field::new("document", DataType::Utf8, false),
            Field::new("source", DataType::Utf8, false),
            Field::new(
                "embedding",
                DataType::List(Arc::new(Field::new("item", DataType::Float32, true))),
                false,
            ),
        ]))
    }

    pub fn records(&self) -> Result<Vec<VectorRecord>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let file = File::open(&self.path)
            .with_context(|| format!("open parquet: {}", self.path.display()))?;
        let reader = ParquetRecordBatchReaderBuilder::try_new(file)
            .context("build parquet reader")?
            .build()
            .context("open parquet batch reader")?;

        let mut out = Vec::new();
        for batch in reader {
            let batch = batch.context("read parquet batch")?;
            let column = |name: &str| {
                batch
                    .column_by_name(name)
                    .with_context(|| format!("missing column '{name}'"))
            };
            let ids = column("id")?.as_string::<i32>();
            let documents = column("document")?.as_string::<i32>();
            let sources = column("source")?.as_string::<i32>();
            let embeddings = column("embedding")?.as_list::<i32>();

            for i in 0..batch.num_rows() {
                let values = embeddings.value(i);
                out.push(VectorRecord {
                    id: ids.value(i).to_string(),
                    document: documents.value(i).to_string(),
                    source: sources.value(i).to_string(),
                    embedding: values.as_primitive::<Float32Type>().values().to_vec(),
                });
            }
        }

        Ok(out)
    }

    pub fn count(&self) -> Result<usize> {
        Ok(self.records()?.len())
    }

    pub fn get(&self, id: &str) -> Result<Option<VectorRecord>> {
        Ok(self.records()?.into_iter().find(|r| r.id == id))
    }

    /// Insert or replace by id, keeping first-insertion order. Returns the
    /// collection size afterwards.
    pub fn upsert(&self, records: Vec<VectorRecord>) -> Result<usize> {
        let mut current = self.records()?;
        let mut positions: HashMap<String, usize> = current
            .iter()
            .enumerate()
            .map(|(i, r)| (r.id.clone(), i))
            .collect();

        for record in records {
            match positions.get(&record.id) {
                Some(&i) => current[i] = record,
                None => {
                    positions.insert(record.id.clone(), current.len());
                    current.push(record);
                }
            }
        }

        self.write_all(&current)?;
        Ok(current.len())
    }

    fn write_all(&self, records: &[VectorRecord]) -> Result<()> {
        let schema = Self::schema();

        let mut embeddings = ListBuilder::new(Float32Builder::new());
        for r in records {
            embeddings.values().append_slice(&r.embedding);
            embeddings.append(true);
        }

        let columns: Vec<ArrayRef> = vec![
            Arc::new(StringArray::from_iter_values(records.iter().map(|r| r.id.as_str()))),
            Arc::new(StringArray::from_iter_values(records.iter().map(|r| r.document.as_str()))),
            Arc::new(StringArray::from_iter_values(records.iter().map(|r| r.source.as_str()))),
            Arc::new(embeddings.finish()),
        ];
        let batch = RecordBatch::try_new(schema.clone(), columns).context("build record batch")?;

        let tmp = self.path.with_extension("parquet.tmp");
        let file = File::create(&tmp).with_context(|| format!("create {}", tmp.display()))?;
        let mut writer = ArrowWriter::try_new(file, schema, None).context("open parquet writer")?;
        writer.write(&batch).context("write parquet batch")?;
        writer.close().context("finish parquet file")?;

        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("replace {}", self.path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embed::HashEmbeddingProvider;

    fn write_docs(dir: &Path, files: &[(&str, &str)]) {
        for (name, body) in files {
            std::fs::write(dir.join(name), body).unwrap();
        }
    }

    #[test]
    fn collects_sorted_text_files_and_skips_empty_ones() {
        let dir = tempfile::tempdir().unwrap();
        write_docs(
            dir.path(),
            &[
                ("b_roaming.txt", "Roaming can be activated from the app.\n"),
                ("a_recharge.txt", "  Recharge with *123#.  "),
                ("c_empty.txt", "   \n"),
                ("d_notes.md", "ignored"),
                ("e_sim.txt", "Block a lost SIM via the helpline."),
            ],
        );

        let docs = collect_documents(dir.path()).unwrap();
        let ids: Vec<_> = docs.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, ["doc-0", "doc-1", "doc-3"]);
        assert_eq!(docs[0].source, "a_recharge.txt");
        assert_eq!(docs[0].text, "Recharge with *123#.");
        assert_eq!(docs[2].source, "e_sim.txt");
    }

    #[test]
    fn reingesting_overwrites_instead_of_duplicating() {
        let docs = tempfile::tempdir().unwrap();
        let db = tempfile::tempdir().unwrap();
        write_docs(
            docs.path(),
            &[("a.txt", "Dial *456# for data."), ("b.txt", "Dial 111 for support.")],
        );
        let store = ParquetVectorStore::open(db.path(), DEFAULT_COLLECTION).unwrap();
        let embedder = HashEmbeddingProvider::new(32);

        let first = ingest_directory(docs.path(), &store, &embedder).unwrap().unwrap();
        assert_eq!(first, IngestReport { upserted: 2, collection_size: 2 });

        std::fs::write(docs.path().join("a.txt"), "Dial *456# to check data balance.").unwrap();
        let second = ingest_directory(docs.path(), &store, &embedder).unwrap().unwrap();
        assert_eq!(second.collection_size, 2);

        let doc0 = store.get("doc-0").unwrap().expect("doc-0 stored");
        assert_eq!(doc0.document, "Dial *456# to check data balance.");
        assert_eq!(doc0.source, "a.txt");
        assert_eq!(doc0.embedding.len(), 32);
        assert_eq!(store.count().unwrap(), 2);
    }

    #[test]
    fn empty_directory_leaves_store_untouched() {
        let docs = tempfile::tempdir().unwrap();
        let db = tempfile::tempdir().unwrap();
        let store = ParquetVectorStore::open(db.path(), "support_faqs").unwrap();

        let report =
            ingest_directory(docs.path(), &store, &HashEmbeddingProvider::new(16)).unwrap();
        assert!(report.is_none());
        assert!(!store.path().exists());
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn upsert_keeps_first_insertion_order() {
        let db = tempfile::tempdir().unwrap();
        let store = ParquetVectorStore::open(db.path(), "c").unwrap();
        let rec = |id: &str, doc: &str| VectorRecord {
            id: id.to_string(),
            document: doc.to_string(),
            source: format!("{id}.txt"),
            embedding: vec![0.5, -0.5],
        };

        store.upsert(vec![rec("x", "one"), rec("y", "two")]).unwrap();
        let size = store.upsert(vec![rec("z", "three"), rec("x", "uno")]).unwrap();
        assert_eq!(size, 3);

        let records = store.records().unwrap();
        let order: Vec<_> = records.iter().map(|r| (r.id.as_str(), r.document.as_str())).collect();
        assert_eq!(order, [("x", "uno"), ("y", "two"), ("z", "three")]);
        assert_eq!(records[0].embedding, vec![0.5, -0.5]);
    }

    #[test]
    fn rejects_path_like_collection_names() {
        let db = tempfile::tempdir().unwrap();
        assert!(ParquetVectorStore::open(db.path(), "../escape").is_err());
        assert!(ParquetVectorStore::open(db.path(), "").is_err());
    }
}
