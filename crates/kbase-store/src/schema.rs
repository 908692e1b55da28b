//! Database schema SQL.
//!
//! Every row carries `organisation_id`; searches filter on it in SQL.

/// Core tables: documents, chunks, chunk_embeddings.
pub const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS documents (
    organisation_id TEXT NOT NULL,
    id TEXT NOT NULL,
    title TEXT,
    content_hash TEXT NOT NULL,
    metadata_json TEXT,
    chunk_count INTEGER NOT NULL DEFAULT 0,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    PRIMARY KEY (organisation_id, id)
);

CREATE TABLE IF NOT EXISTS chunks (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    id TEXT NOT NULL UNIQUE,
    organisation_id TEXT NOT NULL,
    document_id TEXT NOT NULL,
    content TEXT NOT NULL,
    chunk_index INTEGER NOT NULL,
    start_index INTEGER NOT NULL,
    end_index INTEGER NOT NULL,
    metadata_json TEXT,
    created_at INTEGER NOT NULL,
    FOREIGN KEY (organisation_id, document_id)
        REFERENCES documents(organisation_id, id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_chunks_scope ON chunks(organisation_id, document_id);

CREATE TABLE IF NOT EXISTS chunk_embeddings (
    chunk_seq INTEGER PRIMARY KEY REFERENCES chunks(seq) ON DELETE CASCADE,
    embedding BLOB NOT NULL,
    scale REAL NOT NULL,
    offset_val REAL NOT NULL
);
"#;

/// FTS5 index over chunk content.
pub const FTS_SCHEMA_SQL: &str = r#"
CREATE VIRTUAL TABLE IF NOT EXISTS chunks_fts USING fts5(
    content,
    content='chunks', content_rowid='seq',
    tokenize='porter unicode61'
);
"#;

/// Keep the FTS index in sync with the chunks table.
pub const FTS_TRIGGERS_SQL: &str = r#"
CREATE TRIGGER IF NOT EXISTS chunks_ai AFTER INSERT ON chunks BEGIN
    INSERT INTO chunks_fts(rowid, content) VALUES (new.seq, new.content);
END;

CREATE TRIGGER IF NOT EXISTS chunks_ad AFTER DELETE ON chunks BEGIN
    INSERT INTO chunks_fts(chunks_fts, rowid, content) VALUES ('delete', old.seq, old.content);
END;

CREATE TRIGGER IF NOT EXISTS chunks_au AFTER UPDATE ON chunks BEGIN
    INSERT INTO chunks_fts(chunks_fts, rowid, content) VALUES ('delete', old.seq, old.content);
    INSERT INTO chunks_fts(rowid, content) VALUES (new.seq, new.content);
END;
"#;
