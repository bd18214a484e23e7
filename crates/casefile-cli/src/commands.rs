//! Subcommand handlers.

use std::sync::Arc;

use anyhow::{Context as _, Result, bail};
use casefile_core::{
  beneficiary::{CivilStatus, FormAssignment, Gender, Place, ProfileDraft, ProfileField},
  store::RecordStore,
};
use casefile_engine::{Catalog, FormFillView, view::QuestionView};
use casefile_store_sqlite::SqliteStore;
use chrono::{Local, NaiveDate};

use crate::AppEngine;

pub struct Context {
  pub engine: AppEngine,
  pub store:  Arc<SqliteStore>,
}

pub struct NewBeneficiary {
  pub name:         String,
  pub birth_date:   NaiveDate,
  pub civil_status: CivilStatus,
  pub county_id:    i64,
  pub city_id:      i64,
  pub gender:       Gender,
}

// ─── Forms and sync ──────────────────────────────────────────────────────────

pub async fn refresh(ctx: &Context) -> Result<()> {
  let report = ctx
    .engine
    .reconciler
    .refresh()
    .await
    .context("form refresh failed")?;

  for s in &report.installed {
    println!("installed  {:>5}  v{:<3} {}", s.id, s.version, s.description);
  }
  for f in &report.failures {
    println!("failed     {:>5}  {}", f.form_id, f.error);
  }
  println!("{} form(s) already up to date", report.up_to_date);

  if !report.is_complete() {
    bail!("{} form(s) could not be updated", report.failures.len());
  }
  Ok(())
}

pub async fn sync(ctx: &Context) -> Result<()> {
  let report = ctx
    .engine
    .dispatcher
    .sync_unsynced_data()
    .await
    .context("sync failed")?;
  println!(
    "synced {} answer(s) in {} batch(es)",
    report.synced_answers, report.batches
  );
  Ok(())
}

pub async fn status(ctx: &Context) -> Result<()> {
  let forms = Catalog::new(ctx.store.clone()).form_summaries().await?;
  let beneficiaries = ctx.store.list_beneficiaries().await?;
  let unregistered = beneficiaries.iter().filter(|b| !b.is_registered()).count();
  let pending = ctx.engine.dispatcher.unsynced_count().await?;

  println!("forms cached:          {}", forms.len());
  println!("beneficiaries:         {} ({unregistered} unregistered)", beneficiaries.len());
  println!("answers awaiting sync: {pending}");
  Ok(())
}

pub async fn forms(ctx: &Context) -> Result<()> {
  for s in Catalog::new(ctx.store.clone()).form_summaries().await? {
    println!("{:>5}  v{:<3} {:<10} {}", s.id, s.version, s.code, s.description);
  }
  Ok(())
}

// ─── Beneficiaries ───────────────────────────────────────────────────────────

pub async fn add_beneficiary(ctx: &Context, input: NewBeneficiary) -> Result<()> {
  let reference = &ctx.engine.reference;

  let county = reference
    .counties()
    .await
    .context("failed to load counties")?
    .into_iter()
    .find(|c| c.id == input.county_id)
    .with_context(|| format!("unknown county {}", input.county_id))?;
  let city = reference
    .cities(county.id)
    .await
    .context("failed to load cities")?
    .into_iter()
    .find(|c| c.id == input.city_id)
    .with_context(|| format!("unknown city {} in {}", input.city_id, county.name))?;

  let mut draft = ProfileDraft::new();
  draft.set(ProfileField::Name(input.name));
  draft.set(ProfileField::BirthDate(input.birth_date));
  draft.set(ProfileField::CivilStatus(input.civil_status));
  draft.set(ProfileField::County(Place::from(county)));
  draft.set(ProfileField::City(Place::from(city)));
  draft.set(ProfileField::Gender(input.gender));

  let today = Local::now().date_naive();
  let b = ctx.engine.registrar.create(draft, today).await?;
  println!("created beneficiary {}", b.beneficiary_id);
  Ok(())
}

pub async fn list_beneficiaries(ctx: &Context) -> Result<()> {
  let today = Local::now().date_naive();
  for b in ctx.store.list_beneficiaries().await? {
    let p = &b.profile;
    let forms: Vec<String> = b.forms.iter().map(i64::to_string).collect();
    println!(
      "{:>6}  {:<24} {:>3}y  {:<10} {}{}",
      b.beneficiary_id,
      p.name,
      p.age_on(today),
      p.city.name,
      forms.join(","),
      if b.is_registered() { "" } else { "  (unregistered)" },
    );
  }
  Ok(())
}

pub async fn register(ctx: &Context, id: i64, added: Vec<i64>, removed: Vec<i64>) -> Result<()> {
  let b = ctx
    .engine
    .registrar
    .register(id, FormAssignment { added, removed })
    .await
    .with_context(|| format!("failed to register beneficiary {id}"))?;
  println!("beneficiary {id} registered as {}", b.beneficiary_id);
  settle(ctx).await;
  Ok(())
}

// ─── Answering ───────────────────────────────────────────────────────────────

pub async fn show(ctx: &Context, form: i64, beneficiary: i64, json: bool) -> Result<()> {
  let view = ctx.engine.answers.build_view(form, beneficiary).await?;
  if json {
    println!("{}", serde_json::to_string_pretty(&view)?);
  } else {
    print_view(&view);
  }
  Ok(())
}

pub async fn select(
  ctx: &Context,
  form: i64,
  beneficiary: i64,
  question: i64,
  option: usize,
) -> Result<()> {
  let answers = &ctx.engine.answers;
  let view = answers.build_view(form, beneficiary).await?;
  let view = answers
    .apply_selection(&view, question, option)
    .await
    .context("failed to save answer")?;
  print_question(&view, question);
  settle(ctx).await;
  Ok(())
}

pub async fn text(
  ctx: &Context,
  form: i64,
  beneficiary: i64,
  question: i64,
  option: usize,
  text: &str,
) -> Result<()> {
  let answers = &ctx.engine.answers;
  let view = answers.build_view(form, beneficiary).await?;
  let view = answers
    .apply_free_text(&view, question, option, text)
    .await
    .context("failed to save answer")?;
  print_question(&view, question);
  settle(ctx).await;
  Ok(())
}

pub async fn note(
  ctx: &Context,
  form: i64,
  beneficiary: i64,
  question: i64,
  text: Option<String>,
) -> Result<()> {
  let answers = &ctx.engine.answers;
  let view = answers.build_view(form, beneficiary).await?;
  let view = answers
    .attach_note(&view, question, text)
    .await
    .context("failed to save note")?;
  print_question(&view, question);
  Ok(())
}

pub async fn finalize(ctx: &Context, form: i64, beneficiary: i64) -> Result<()> {
  ctx.engine.answers.finalize(form, beneficiary).await?;
  println!("form {form} is complete for beneficiary {beneficiary}");
  Ok(())
}

pub async fn filled(ctx: &Context, beneficiary: i64) -> Result<()> {
  for f in ctx.engine.answers.filled_forms(beneficiary).await? {
    println!(
      "{:>5}  v{:<3} {}  {}{}",
      f.form_id,
      f.form_version,
      f.filled_on.with_timezone(&Local).format("%d/%m/%Y"),
      f.description,
      if f.synced { "" } else { "  (not synced)" },
    );
  }
  Ok(())
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

/// Run one sync pass before exiting so answers saved by this invocation are
/// not left to a background task the process would abort.
async fn settle(ctx: &Context) {
  match ctx.engine.dispatcher.sync_unsynced_data().await {
    Ok(report) if report.synced_answers > 0 => {
      println!("synced {} answer(s)", report.synced_answers);
    }
    Ok(_) => {}
    Err(error) => tracing::warn!(%error, "saved locally; sync deferred"),
  }
}

fn print_view(view: &FormFillView) {
  println!(
    "{} v{}  {}  ({} of {} answered)",
    view.form.code,
    view.form.version,
    view.form.description,
    view.answered_count(),
    view.questions.len()
  );
  let mut section = None;
  for q in &view.questions {
    if section != Some(q.section_id) {
      section = Some(q.section_id);
      println!("\n── section {} ──", q.section_id);
    }
    print_question_view(q);
  }
}

fn print_question(view: &FormFillView, question_id: i64) {
  if let Some(q) = view.question(question_id) {
    print_question_view(q);
  }
}

fn print_question_view(q: &QuestionView) {
  let state = match (q.is_saved, q.is_synced) {
    (true, true) => "synced",
    (true, false) => "saved",
    _ => "",
  };
  println!(
    "{}{} [{}] {} {}{}",
    q.code,
    if q.mandatory { "*" } else { "" },
    q.question_id,
    q.text,
    state,
    if q.is_note_attached { " (note)" } else { "" },
  );
  for (i, o) in q.options.iter().enumerate() {
    let mark = if o.selected { "x" } else { " " };
    match &o.user_text {
      Some(t) if o.selected => println!("  {i}. [{mark}] {}: {t}", o.text),
      _ => println!("  {i}. [{mark}] {}", o.text),
    }
  }
}
