use crate::cli::HistoryCommand;
use crate::config::HistoryConfig;
use crate::error::{ExamSnapError, Result};
use crate::history::{AnalyzedProblem, HistoryStore};
use colored::Colorize;
use prettytable::{format, Table};
use std::io::{BufRead, Write};

const ID_WIDTH: usize = 10;
const CONCEPTS_WIDTH: usize = 40;

/// Handle history commands
pub async fn handle_history(command: HistoryCommand, config: &HistoryConfig) -> Result<()> {
    let store = HistoryStore::open(config)?;
    run_history_command(command, &store).await
}

/// Run a history command against an open store
pub async fn run_history_command(command: HistoryCommand, store: &HistoryStore) -> Result<()> {
    match command {
        HistoryCommand::List { limit } => {
            let mut problems = store.read_all();
            if let Some(limit) = limit {
                problems.truncate(limit);
            }
            print_history_table(&problems);
        }
        HistoryCommand::Show { id, image } => {
            let problem = store.find(&id).ok_or_else(|| {
                ExamSnapError::Storage(format!("No unique history entry matches '{}'", id))
            })?;
            crate::commands::print_problem(&problem);

            if let Some(out) = image {
                let bytes = problem
                    .problem_image_uri
                    .decode_payload()
                    .map_err(|e| ExamSnapError::Storage(format!("Stored image is invalid: {}", e)))?;
                tokio::fs::write(&out, &bytes).await?;
                println!(
                    "{}",
                    format!("Saved {} image to {}", problem.problem_image_uri.mime(), out.display())
                        .green()
                );
            }
        }
        HistoryCommand::Clear { yes } => {
            if !yes && !confirm("Delete the whole history? [y/N] ")? {
                println!("{}", "History kept.".yellow());
                return Ok(());
            }
            store.clear_all()?;
            println!("{}", "History cleared.".green());
        }
    }

    Ok(())
}

/// Print problems as a table, newest first
pub fn print_history_table(problems: &[AnalyzedProblem]) {
    if problems.is_empty() {
        println!("{}", "No analyzed problems yet.".yellow());
        return;
    }

    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_BORDERS_ONLY);

    table.add_row(prettytable::row![
        "ID".bold(),
        "Analyzed".bold(),
        "Key Concepts".bold(),
        "Image".bold()
    ]);

    for problem in problems {
        let id_short: String = problem.id.chars().take(ID_WIDTH).collect();
        let analyzed = problem.created_at().format("%Y-%m-%d %H:%M").to_string();
        let image = format!(
            "{} ({} KB)",
            problem.problem_image_uri.mime(),
            problem.problem_image_uri.approx_decoded_len().div_ceil(1024)
        );

        table.add_row(prettytable::row![
            id_short.cyan(),
            analyzed,
            first_line(&problem.concepts, CONCEPTS_WIDTH),
            image
        ]);
    }

    println!("\nRevision History:");
    table.printstd();
    println!();
    println!(
        "Use {} to read an entry.",
        "examsnap history show <ID>".cyan()
    );
    println!();
}

fn first_line(text: &str, width: usize) -> String {
    let line = text.lines().map(str::trim).find(|l| !l.is_empty()).unwrap_or("-");
    if line.chars().count() > width {
        let cut: String = line.chars().take(width.saturating_sub(3)).collect();
        format!("{}...", cut)
    } else {
        line.to_string()
    }
}

fn confirm(prompt: &str) -> Result<bool> {
    print!("{}", prompt);
    std::io::stdout().flush()?;
    let mut answer = String::new();
    std::io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{assert_error_contains, sample_problem, temp_dir, tiny_png};

    #[test]
    fn test_first_line_truncates_by_chars() {
        assert_eq!(first_line("", 10), "-");
        assert_eq!(first_line("\n  Ratios\nmore", 10), "Ratios");
        assert_eq!(first_line("ééééééééééééé", 8), "ééééé...");
    }

    #[tokio::test]
    async fn test_show_writes_image() {
        let dir = temp_dir();
        let store = HistoryStore::in_memory();
        store.append(&sample_problem("01HXAMPLE", 1_700_000_000_000));

        let out = dir.path().join("problem.png");
        run_history_command(
            HistoryCommand::Show {
                id: "01HX".to_string(),
                image: Some(out.clone()),
            },
            &store,
        )
        .await
        .unwrap();
        assert_eq!(std::fs::read(out).unwrap(), tiny_png());
    }

    #[tokio::test]
    async fn test_show_unknown_id() {
        let result = run_history_command(
            HistoryCommand::Show {
                id: "nope".to_string(),
                image: None,
            },
            &HistoryStore::in_memory(),
        )
        .await;
        assert_error_contains(result, "No unique history entry");
    }

    #[tokio::test]
    async fn test_clear_with_yes() {
        let store = HistoryStore::in_memory();
        store.append(&sample_problem("a", 1));

        run_history_command(HistoryCommand::Clear { yes: true }, &store)
            .await
            .unwrap();
        assert!(store.read_all().is_empty());
    }

    #[tokio::test]
    async fn test_list_on_disk_store() {
        let dir = temp_dir();
        let config = HistoryConfig {
            path: Some(dir.path().join("history.sled").to_string_lossy().to_string()),
            enabled: true,
        };
        handle_history(HistoryCommand::List { limit: Some(3) }, &config)
            .await
            .unwrap();
    }
}
