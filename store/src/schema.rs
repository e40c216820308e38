//! Schema creation. Migration beyond "create what's missing" is out of
//! scope; a future schema-versioned migrator is a transport/deployment
//! concern, not a core one.

use rusqlite::Connection;

pub fn init(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "
        PRAGMA journal_mode = WAL;
        PRAGMA foreign_keys = ON;

        CREATE TABLE IF NOT EXISTS projects (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            repo_path TEXT NOT NULL,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS quests (
            id TEXT PRIMARY KEY,
            project_id TEXT NOT NULL REFERENCES projects(id),
            title TEXT NOT NULL,
            status TEXT NOT NULL,
            tier TEXT NOT NULL,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS quest_messages (
            id TEXT PRIMARY KEY,
            quest_id TEXT NOT NULL REFERENCES quests(id),
            role TEXT NOT NULL,
            content TEXT NOT NULL,
            tool_calls_json TEXT NOT NULL DEFAULT '[]',
            created_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_quest_messages_quest ON quest_messages(quest_id, created_at);

        CREATE TABLE IF NOT EXISTS tasks (
            id TEXT PRIMARY KEY,
            project_id TEXT NOT NULL REFERENCES projects(id),
            quest_id TEXT REFERENCES quests(id),
            title TEXT NOT NULL,
            description TEXT NOT NULL,
            role TEXT NOT NULL,
            priority INTEGER NOT NULL,
            tier TEXT NOT NULL,
            status TEXT NOT NULL,
            base_branch TEXT NOT NULL,
            worktree_path TEXT,
            branch_name TEXT,
            total_input_tokens INTEGER NOT NULL DEFAULT 0,
            total_output_tokens INTEGER NOT NULL DEFAULT 0,
            total_cost_cents INTEGER NOT NULL DEFAULT 0,
            unsatisfied_deps INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_tasks_status ON tasks(status);

        CREATE TABLE IF NOT EXISTS task_dependencies (
            objective_id TEXT NOT NULL REFERENCES tasks(id),
            depends_on TEXT NOT NULL REFERENCES tasks(id),
            PRIMARY KEY (objective_id, depends_on)
        );

        CREATE TABLE IF NOT EXISTS checklist_items (
            id TEXT PRIMARY KEY,
            objective_id TEXT NOT NULL REFERENCES tasks(id),
            ordinal INTEGER NOT NULL,
            description TEXT NOT NULL,
            must_have INTEGER NOT NULL,
            status TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_checklist_objective ON checklist_items(objective_id, ordinal);

        CREATE TABLE IF NOT EXISTS sessions (
            id TEXT PRIMARY KEY,
            objective_id TEXT NOT NULL REFERENCES tasks(id),
            status TEXT NOT NULL,
            iteration_count INTEGER NOT NULL DEFAULT 0,
            outcome TEXT,
            current_role TEXT NOT NULL,
            created_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_sessions_objective ON sessions(objective_id);

        CREATE TABLE IF NOT EXISTS iterations (
            session_id TEXT NOT NULL REFERENCES sessions(id),
            iteration INTEGER NOT NULL,
            input_tokens INTEGER NOT NULL,
            output_tokens INTEGER NOT NULL,
            cost_cents INTEGER NOT NULL,
            tool_calls_json TEXT NOT NULL,
            context_used_tokens INTEGER NOT NULL,
            context_max_tokens INTEGER NOT NULL,
            created_at TEXT NOT NULL,
            PRIMARY KEY (session_id, iteration)
        );

        CREATE TABLE IF NOT EXISTS checkpoints (
            id TEXT PRIMARY KEY,
            session_id TEXT NOT NULL REFERENCES sessions(id),
            last_assistant_message TEXT NOT NULL,
            current_role TEXT NOT NULL,
            iteration INTEGER NOT NULL,
            budget_remaining_tokens INTEGER NOT NULL,
            budget_remaining_cents INTEGER NOT NULL,
            created_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_checkpoints_session ON checkpoints(session_id, iteration DESC);

        CREATE TABLE IF NOT EXISTS approvals (
            id TEXT PRIMARY KEY,
            objective_id TEXT REFERENCES tasks(id),
            quest_id TEXT REFERENCES quests(id),
            kind TEXT NOT NULL,
            status TEXT NOT NULL,
            created_at TEXT NOT NULL
        );
        ",
    )
}
