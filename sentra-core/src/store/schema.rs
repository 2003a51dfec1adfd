//! Database schema definitions

/// SQL to create all tables
pub const SCHEMA: &str = r#"
-- Entity graph
CREATE TABLE IF NOT EXISTS entities (
    id TEXT PRIMARY KEY,
    entity_type TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    confidence REAL NOT NULL DEFAULT 1.0
        CHECK (confidence >= 0.0 AND confidence <= 1.0),
    data TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS relationships (
    parent_id TEXT NOT NULL REFERENCES entities(id) ON DELETE CASCADE,
    child_id TEXT NOT NULL REFERENCES entities(id) ON DELETE CASCADE,
    relationship_type TEXT NOT NULL,
    created_at TEXT NOT NULL,
    PRIMARY KEY (parent_id, child_id, relationship_type)
);

-- Execution history (append-only)
CREATE TABLE IF NOT EXISTS executions (
    execution_id TEXT PRIMARY KEY,
    tool_id TEXT NOT NULL,
    stage_id INTEGER,
    status TEXT NOT NULL,
    parse_status TEXT NOT NULL,
    raw_output TEXT,
    started_at TEXT NOT NULL,
    completed_at TEXT NOT NULL,
    entities_created INTEGER NOT NULL DEFAULT 0,
    error_message TEXT
);

-- Indexes for common queries
CREATE INDEX IF NOT EXISTS idx_entities_type ON entities(entity_type);
CREATE INDEX IF NOT EXISTS idx_entities_updated ON entities(updated_at);
CREATE INDEX IF NOT EXISTS idx_rel_parent ON relationships(parent_id, relationship_type);
CREATE INDEX IF NOT EXISTS idx_rel_child ON relationships(child_id, relationship_type);
CREATE INDEX IF NOT EXISTS idx_executions_tool ON executions(tool_id);
CREATE INDEX IF NOT EXISTS idx_executions_started ON executions(started_at);
"#;
