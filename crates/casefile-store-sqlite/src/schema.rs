//! SQL schema for the Casefile SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

-- Negative ids are temporary; registration rewrites them in place and the
-- change cascades to assignments and answers.
CREATE TABLE IF NOT EXISTS beneficiaries (
    beneficiary_id INTEGER PRIMARY KEY,
    name           TEXT    NOT NULL,
    birth_date     TEXT    NOT NULL,   -- YYYY-MM-DD
    civil_status   INTEGER NOT NULL,
    county_id      INTEGER NOT NULL,
    county         TEXT    NOT NULL,
    city_id        INTEGER NOT NULL,
    city           TEXT    NOT NULL,
    gender         INTEGER NOT NULL,
    created_at     TEXT    NOT NULL    -- RFC 3339 UTC
);

CREATE TABLE IF NOT EXISTS beneficiary_forms (
    beneficiary_id INTEGER NOT NULL
        REFERENCES beneficiaries(beneficiary_id) ON UPDATE CASCADE ON DELETE CASCADE,
    form_id        INTEGER NOT NULL,
    PRIMARY KEY (beneficiary_id, form_id)
);

-- One row per question of a form version that has been interacted with.
CREATE TABLE IF NOT EXISTS questions (
    form_id       INTEGER NOT NULL,
    form_version  INTEGER NOT NULL,
    question_id   INTEGER NOT NULL,
    question_type INTEGER NOT NULL,
    section_id    INTEGER,
    note          TEXT,
    PRIMARY KEY (form_id, form_version, question_id)
);

-- Answers are replaced wholesale per (beneficiary, question); only `synced`
-- is ever updated in place.
CREATE TABLE IF NOT EXISTS answers (
    answer_id      TEXT    PRIMARY KEY,
    beneficiary_id INTEGER NOT NULL
        REFERENCES beneficiaries(beneficiary_id) ON UPDATE CASCADE ON DELETE CASCADE,
    form_id        INTEGER NOT NULL,
    form_version   INTEGER NOT NULL,
    question_id    INTEGER NOT NULL,
    option_id      INTEGER NOT NULL,
    selected       INTEGER NOT NULL DEFAULT 1,
    is_free_text   INTEGER NOT NULL DEFAULT 0,
    user_text      TEXT,
    synced         INTEGER NOT NULL DEFAULT 0,
    fill_date      TEXT    NOT NULL,
    FOREIGN KEY (form_id, form_version, question_id)
        REFERENCES questions(form_id, form_version, question_id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS cache (
    key        TEXT PRIMARY KEY,
    value_json TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS answers_question_idx ON answers(beneficiary_id, form_id, question_id);
CREATE INDEX IF NOT EXISTS answers_synced_idx   ON answers(synced);
CREATE INDEX IF NOT EXISTS answers_form_idx     ON answers(form_id, form_version);

PRAGMA user_version = 1;
";
