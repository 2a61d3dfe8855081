use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Local, Utc};
use client_core::{
    AnswerSource, DriverConfig, DriverExit, PortalClient, SaveOutcome, SessionController,
    SessionDependencies, SessionError, SessionEvent, SubmitOutcome, SystemClock,
};
use shared::{
    domain::{AnswerKind, AnswerValue, Question, QuestionId, SubmissionState},
    format::{format_countdown, format_time_taken},
};
use storage::LocalStore;
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::{broadcast::error::RecvError, Mutex},
};
use tracing::{info, warn};

use crate::config::Settings;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    List,
    Status,
    Show(usize),
    Answer { number: usize, text: String },
    Toggle { number: usize, option: String },
    Clear(usize),
    Save,
    Submit,
    Confirm,
    Exit,
}

/// Parses one line of interview input. Blank lines yield `Ok(None)`.
/// Question numbers are 1-based, as listed.
pub fn parse_command(line: &str) -> Result<Option<Command>, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let (word, rest) = line
        .split_once(char::is_whitespace)
        .map(|(word, rest)| (word, rest.trim()))
        .unwrap_or((line, ""));

    let command = match word.to_ascii_lowercase().as_str() {
        "help" | "?" => Command::Help,
        "list" | "ls" => Command::List,
        "status" => Command::Status,
        "show" => Command::Show(parse_number(rest)?),
        "clear" => Command::Clear(parse_number(rest)?),
        "answer" => {
            let (number, text) = split_number(rest)?;
            Command::Answer {
                number,
                text: text.replace("\\n", "\n"),
            }
        }
        "toggle" => {
            let (number, option) = split_number(rest)?;
            if option.is_empty() {
                return Err("usage: toggle <n> <option>".to_string());
            }
            Command::Toggle {
                number,
                option: option.to_string(),
            }
        }
        "save" => Command::Save,
        "submit" => Command::Submit,
        "yes" | "y" => Command::Confirm,
        "exit" | "quit" => Command::Exit,
        other => return Err(format!("unknown command '{other}', type 'help'")),
    };
    Ok(Some(command))
}

fn parse_number(raw: &str) -> Result<usize, String> {
    raw.trim()
        .parse::<usize>()
        .ok()
        .filter(|number| *number > 0)
        .ok_or_else(|| format!("expected a question number, got '{}'", raw.trim()))
}

fn split_number(rest: &str) -> Result<(usize, &str), String> {
    let (number, tail) = rest
        .split_once(char::is_whitespace)
        .unwrap_or((rest, ""));
    Ok((parse_number(number)?, tail.trim()))
}

const HELP: &str = "\
commands:
  list                   questions with their answer status
  show <n>               full question and your current answer
  answer <n> <text>      replace a text answer (\\n for a line break)
  toggle <n> <option>    select or deselect a multiple-choice option
  clear <n>              remove an answer
  status                 time remaining and progress
  save                   save progress now
  submit                 submit the interview (asks to confirm)
  exit                   save and log out";

pub async fn run(settings: &Settings, store: Arc<dyn LocalStore>, client: PortalClient) -> Result<()> {
    let dependencies = SessionDependencies {
        store,
        sink: Arc::new(client.clone()),
        clock: Arc::new(SystemClock),
    };

    let mut controller = match SessionController::load(&client, dependencies).await {
        Ok(controller) => controller,
        Err(SessionError::NoQuestions) => {
            println!("No questions available.");
            println!("No questions have been assigned to this interview yet. Please contact the recruiter.");
            return Ok(());
        }
        Err(err) if err.requires_login() => {
            println!("{err}");
            println!("Run `candidate login` to sign in again.");
            return Ok(());
        }
        Err(err) => return Err(err.into()),
    };

    let duration = controller.campaign().duration_per_candidate;
    controller.start(duration, AnswerSource::Restore).await?;
    if controller.state() == SubmissionState::Submitted {
        println!("This interview has already been submitted.");
        println!("Time taken: {}", format_time_taken(controller.elapsed_minutes()));
        println!("Run `candidate results` once your results are published.");
        return Ok(());
    }
    let mut events = controller.subscribe();

    println!("{}", controller.campaign().name);
    println!(
        "{} questions, {} remaining. Type 'help' for commands.",
        controller.questions().len(),
        format_countdown(controller.remaining_secs())
    );
    print_list(&controller);

    let controller = Arc::new(Mutex::new(controller));
    let driver = client_core::SessionDriver::spawn(
        controller.clone(),
        DriverConfig {
            autosave_interval: settings.autosave_interval,
            ..DriverConfig::default()
        },
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut confirm_pending = false;

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => {
                    let submitted = matches!(event, SessionEvent::Submitted { .. });
                    print_event(&event);
                    if submitted {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "missed session events"),
                Err(RecvError::Closed) => break,
            },
            line = lines.next_line() => {
                let Some(line) = line? else {
                    let mut controller = controller.lock().await;
                    if let Err(err) = controller.save().await {
                        warn!("failed to save progress on end of input: {err}");
                    }
                    info!("input closed, progress saved");
                    break;
                };
                let command = match parse_command(&line) {
                    Ok(Some(command)) => command,
                    Ok(None) => continue,
                    Err(message) => {
                        println!("{message}");
                        continue;
                    }
                };
                let confirmed = std::mem::take(&mut confirm_pending);
                let mut controller = controller.lock().await;
                match command {
                    Command::Help => println!("{HELP}"),
                    Command::List => print_list(&controller),
                    Command::Status => print_status(&controller),
                    Command::Show(number) => match question_at(&controller, number) {
                        Some(question) => print_question(&controller, number, question),
                        None => println!("no question {number}"),
                    },
                    Command::Answer { number, text } => {
                        edit(&mut controller, number, |controller, id| {
                            controller.set_text_answer(id, text)
                        });
                    }
                    Command::Toggle { number, option } => {
                        edit(&mut controller, number, |controller, id| {
                            controller.toggle_choice(id, &option)
                        });
                    }
                    Command::Clear(number) => {
                        edit(&mut controller, number, |controller, id| controller.clear_answer(id));
                    }
                    Command::Save => match controller.save().await {
                        Ok(SaveOutcome::Saved { at }) => println!("Progress saved at {}", local_time(at)),
                        Ok(SaveOutcome::Skipped) => println!("Nothing to save yet."),
                        Err(err) => println!("Failed to save progress: {err}"),
                    },
                    Command::Submit => {
                        let snapshot = controller.snapshot();
                        println!(
                            "You have answered {} of {} questions. Submit now? This cannot be undone. Type 'yes' to confirm.",
                            snapshot.answered, snapshot.total_questions
                        );
                        confirm_pending = true;
                    }
                    Command::Confirm if confirmed => match controller.submit().await {
                        // Completion is reported through the Submitted event.
                        Ok(SubmitOutcome::Submitted { .. }) => {}
                        Ok(SubmitOutcome::AlreadySubmitted) => println!("Interview already submitted."),
                        Ok(SubmitOutcome::InFlight) => println!("Submission in progress..."),
                        Err(err) => warn!("manual submission failed: {err}"),
                    },
                    Command::Confirm => println!("Nothing to confirm."),
                    Command::Exit => {
                        controller.logout().await?;
                        println!("Progress saved. You have been logged out.");
                        break;
                    }
                }
            }
        }
    }

    match driver.shutdown().await {
        DriverExit::Aborted => warn!("session driver ended abnormally"),
        exit => info!(?exit, "session driver stopped"),
    }
    Ok(())
}

fn question_at(controller: &SessionController, number: usize) -> Option<&Question> {
    number
        .checked_sub(1)
        .and_then(|index| controller.questions().get(index))
}

fn edit(
    controller: &mut SessionController,
    number: usize,
    apply: impl FnOnce(&mut SessionController, &QuestionId) -> Result<(), SessionError>,
) {
    let Some(id) = question_at(controller, number).map(|question| question.id.clone()) else {
        println!("no question {number}");
        return;
    };
    match apply(controller, &id) {
        Ok(()) => println!("Question {number} updated."),
        Err(err) => println!("{err}"),
    }
}

fn print_event(event: &SessionEvent) {
    match event {
        SessionEvent::TimeWarning { threshold_secs } => {
            let minutes = threshold_secs / 60;
            let unit = if minutes == 1 { "minute" } else { "minutes" };
            println!("Only {minutes} {unit} remaining!");
        }
        SessionEvent::Autosaved { at, answered } => {
            println!("Progress saved at {} ({answered} answered)", local_time(*at));
        }
        SessionEvent::TimeExpired => println!("Time's up! Auto-submitting your interview..."),
        SessionEvent::Submitted {
            elapsed_minutes,
            forced,
        } => {
            if !forced {
                println!("Interview submitted successfully!");
            }
            println!("Interview completed. Thank you!");
            println!("Time taken: {}", format_time_taken(*elapsed_minutes));
            println!("Run `candidate results` once your results are published.");
        }
        SessionEvent::SubmitFailed { message, forced } => {
            println!("Failed to submit interview. Please try again. ({message})");
            if *forced {
                println!("Your answers are still saved. Type 'submit' to retry.");
            }
        }
    }
}

fn print_list(controller: &SessionController) {
    for (index, question) in controller.questions().iter().enumerate() {
        let mark = if controller.answers().contains(&question.id) {
            "x"
        } else {
            " "
        };
        println!(
            "  [{mark}] {}. {} ({}, {} marks)",
            index + 1,
            question.title,
            question.answer_type.label(),
            question.marks
        );
    }
}

fn print_status(controller: &SessionController) {
    let snapshot = controller.snapshot();
    println!("Time remaining: {}", format_countdown(snapshot.remaining_secs));
    println!(
        "Answered: {}/{}",
        snapshot.answered, snapshot.total_questions
    );
    match snapshot.last_saved {
        Some(at) => println!("Last saved: {}", local_time(at)),
        None => println!("Not saved yet"),
    }
}

fn print_question(controller: &SessionController, number: usize, question: &Question) {
    println!(
        "Question {number} of {}: {}",
        controller.questions().len(),
        question.title
    );
    println!("{} | {} marks", question.answer_type.label(), question.marks);
    if !question.description.is_empty() {
        println!("\n{}", question.description);
    }
    let answer = controller.answers().get(&question.id);

    match question.answer_type {
        AnswerKind::MultipleChoice => {
            let selected = match answer {
                Some(AnswerValue::Choices(choices)) => Some(choices),
                _ => None,
            };
            for option in question.options.iter().flatten() {
                let mark = if selected.is_some_and(|choices| choices.contains(option)) {
                    "x"
                } else {
                    " "
                };
                println!("  [{mark}] {option}");
            }
            return;
        }
        AnswerKind::CodeEditor => {
            if let Some(template) = question.code_template.as_deref().filter(|_| answer.is_none()) {
                println!("\nStarter code:\n{template}");
            }
        }
        AnswerKind::Rating => {
            println!("Rate from 1 to {}.", question.rating_scale.unwrap_or(5));
        }
        AnswerKind::FileUpload => {
            if let Some(types) = question.file_types.as_ref().filter(|types| !types.is_empty()) {
                println!("Accepted file types: {}", types.join(", "));
            }
        }
        AnswerKind::Essay | AnswerKind::Other => {}
    }
    if let Some(rubric) = &question.rubric {
        println!("Evaluation: {rubric}");
    }

    match answer {
        Some(AnswerValue::Text(text)) => println!("\nYour answer:\n{text}"),
        Some(AnswerValue::Choices(choices)) => {
            let choices: Vec<&str> = choices.iter().map(String::as_str).collect();
            println!("\nYour answer: {}", choices.join(", "));
        }
        None => println!("\n(no answer yet)"),
    }
}

fn local_time(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local).format("%H:%M:%S").to_string()
}

#[cfg(test)]
#[path = "tests/interview_tests.rs"]
mod tests;
