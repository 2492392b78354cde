use anyhow::{anyhow, Context, Result};
use mood_quiz::catalog::CATEGORIES;
use mood_quiz::database::Database;
use mood_quiz::models::NewQuestion;
use std::env;
use std::fs;

#[derive(Debug, Default)]
struct ImportStats {
    total_questions: usize,
    valid_questions: usize,
    unknown_categories: usize,
    questions_inserted: usize,
    errors: Vec<String>,
}

impl ImportStats {
    fn print_summary(&self, dry_run: bool) {
        println!("\n=== Import Summary ===");
        println!("Questions in file: {}", self.total_questions);
        println!("Valid questions: {}", self.valid_questions);
        if self.unknown_categories > 0 {
            println!(
                "Questions outside the selectable categories: {}",
                self.unknown_categories
            );
        }

        if !self.errors.is_empty() {
            println!("Invalid questions: {}", self.errors.len());
            for error in &self.errors {
                println!("  - {}", error);
            }
        }

        if dry_run {
            println!("Questions that WOULD BE inserted: {}", self.valid_questions);
            println!("\n** DRY RUN MODE - No changes were made **");
        } else {
            println!("Questions inserted: {}", self.questions_inserted);
        }
    }
}

#[derive(Debug)]
struct ImportArgs {
    path: String,
    dry_run: bool,
}

fn parse_args(args: &[String]) -> Result<ImportArgs> {
    let dry_run = args.iter().any(|arg| arg == "--dry-run");
    let path = args
        .iter()
        .skip(1)
        .find(|arg| !arg.starts_with("--"))
        .cloned()
        .ok_or_else(|| anyhow!("Usage: import_questions <questions.json> [--dry-run]"))?;
    Ok(ImportArgs { path, dry_run })
}

/// Check one question against the table's constraints before touching the database.
fn validate_question(question: &NewQuestion) -> Result<(), String> {
    if question.category.trim().is_empty() {
        return Err("category is empty".to_string());
    }
    if question.prompt.trim().is_empty() {
        return Err("question text is empty".to_string());
    }
    if question.correct_answer.trim().is_empty() {
        return Err("correct answer is empty".to_string());
    }
    if !(1..=3).contains(&question.difficulty) {
        return Err(format!("difficulty {} is not between 1 and 3", question.difficulty));
    }
    if let Some(options) = &question.answer_options {
        let expected = question.correct_answer.trim();
        if !options.iter().any(|option| option.trim() == expected) {
            return Err(format!(
                "correct answer '{}' is not among the answer options",
                question.correct_answer
            ));
        }
    }
    Ok(())
}

fn is_known_category(category: &str) -> bool {
    CATEGORIES.iter().any(|info| info.name == category)
}

fn partition_questions(questions: Vec<NewQuestion>, stats: &mut ImportStats) -> Vec<NewQuestion> {
    stats.total_questions = questions.len();

    let mut valid = Vec::new();
    for (index, question) in questions.into_iter().enumerate() {
        match validate_question(&question) {
            Ok(()) => {
                if !is_known_category(&question.category) {
                    stats.unknown_categories += 1;
                }
                valid.push(question);
            }
            Err(reason) => stats.errors.push(format!(
                "#{} \"{}\": {}",
                index + 1,
                question.prompt.chars().take(40).collect::<String>(),
                reason
            )),
        }
    }

    stats.valid_questions = valid.len();
    valid
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let args: Vec<String> = env::args().collect();
    let ImportArgs { path, dry_run } = parse_args(&args)?;

    println!("=== Question Import Tool ===");
    if dry_run {
        println!("** RUNNING IN DRY-RUN MODE **");
        println!("This will validate the file without writing to the database.");
    }

    let raw = fs::read_to_string(&path).with_context(|| format!("Could not read {}", path))?;
    let questions: Vec<NewQuestion> =
        serde_json::from_str(&raw).with_context(|| format!("{} is not a JSON array of questions", path))?;

    let mut stats = ImportStats::default();
    let valid = partition_questions(questions, &mut stats);

    if dry_run {
        stats.print_summary(true);
        println!("\nTo perform the actual import, run:");
        println!("cargo run --bin import_questions -- {}", path);
        return Ok(());
    }

    if !stats.errors.is_empty() {
        stats.print_summary(false);
        return Err(anyhow!("Import aborted: {} invalid questions", stats.errors.len()));
    }

    let database_url = env::var("DATABASE_URL")
        .unwrap_or_else(|_| "sqlite:mood_quiz.db".to_string());

    println!("\nConnecting to database: {}", database_url);
    let db = Database::new(&database_url).await?;

    stats.questions_inserted = db.insert_questions(&valid).await?;
    println!(
        "\n✓ Inserted {} questions ({} in total)",
        stats.questions_inserted,
        db.count_questions().await?
    );

    stats.print_summary(false);
    Ok(())
}
