//! Line-oriented session driver plus the one-second ticker.

use std::error::Error;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::warn;

use exam_core::format_clock;
use exam_core::model::{AnswerValue, Correctness, QuestionOption};
use services::session::{ReviewPayload, lock_session};
use services::{
    AnswerChange, ExamSessionController, ExamSessionService, ResultStatus, SessionAnswerResult,
    SessionState, SharedSession, TickOutcome,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Answer(usize),
    Next,
    Previous,
    Go(usize),
    Mark,
    Check,
    Pause,
    Submit,
    Retry,
    Review { json: bool },
    Status,
    Save,
    Exit,
    Help,
}

impl Command {
    fn parse(line: &str) -> Result<Self, String> {
        let mut words = line.split_whitespace();
        let Some(head) = words.next() else {
            return Ok(Self::Status);
        };
        let arg = words.next();
        let command = match head.to_ascii_lowercase().as_str() {
            "a" | "answer" => Self::Answer(parse_option(arg)?),
            "n" | "next" => Self::Next,
            "p" | "prev" => Self::Previous,
            "g" | "go" => Self::Go(parse_position(arg)?),
            "m" | "mark" => Self::Mark,
            "c" | "check" => Self::Check,
            "pause" | "resume" => Self::Pause,
            "submit" | "finish" => Self::Submit,
            "retry" => Self::Retry,
            "review" => Self::Review {
                json: arg == Some("json"),
            },
            "s" | "status" => Self::Status,
            "save" => Self::Save,
            "q" | "exit" | "quit" => Self::Exit,
            "h" | "help" | "?" => Self::Help,
            other => return Err(format!("unknown command `{other}`; type `help`")),
        };
        Ok(command)
    }
}

/// `B` or `2` both select the second option.
fn parse_option(arg: Option<&str>) -> Result<usize, String> {
    let raw = arg.ok_or("answer needs an option, e.g. `a B`")?;
    let mut chars = raw.chars();
    if let (Some(letter), None) = (chars.next(), chars.next()) {
        if letter.is_ascii_alphabetic() {
            return Ok(usize::from(letter.to_ascii_uppercase() as u8 - b'A'));
        }
    }
    parse_position(Some(raw))
}

/// One-based position to zero-based index.
fn parse_position(arg: Option<&str>) -> Result<usize, String> {
    let raw = arg.ok_or("missing number")?;
    match raw.parse::<usize>() {
        Ok(n) if n > 0 => Ok(n - 1),
        _ => Err(format!("expected a positive number, got `{raw}`")),
    }
}

enum Flow {
    Continue,
    Quit,
}

pub async fn run(
    service: Arc<ExamSessionService>,
    session: SharedSession,
) -> Result<(), Box<dyn Error>> {
    let ticker = spawn_ticker(Arc::clone(&service), Arc::downgrade(&session));
    print_help();
    print_current(&session)?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let command = match Command::parse(&line) {
            Ok(command) => command,
            Err(message) => {
                println!("{message}");
                continue;
            }
        };
        match execute(&service, &session, command).await {
            Ok(Flow::Continue) => {}
            Ok(Flow::Quit) => break,
            Err(err) => println!("! {err}"),
        }
    }

    ticker.abort();
    Ok(())
}

fn spawn_ticker(
    service: Arc<ExamSessionService>,
    session: Weak<Mutex<ExamSessionController>>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(1));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        interval.tick().await;

        loop {
            interval.tick().await;
            let Some(session) = session.upgrade() else {
                break;
            };
            match service.tick(session).await {
                Ok(TickOutcome::Expired(_)) => {
                    println!("\nTime is up. The exam was submitted; type `review` for results.");
                    break;
                }
                Ok(TickOutcome::Running(remaining)) if remaining == 60 => {
                    println!("\nOne minute left.");
                }
                Ok(_) => {}
                Err(err) => {
                    warn!(error = %err, "ticker stopped");
                    break;
                }
            }
        }
    })
}

async fn execute(
    service: &ExamSessionService,
    session: &SharedSession,
    command: Command,
) -> Result<Flow, Box<dyn Error>> {
    match command {
        Command::Answer(option) => {
            let question_id = current_question_id(session)?;
            let result = service.select_answer(session, question_id, option)?;
            if let Some(note) = answer_note(&result) {
                println!("({note})");
            }
            print_current(session)?;
        }
        Command::Next => {
            if !lock_session(session)?.next_question()? {
                println!("(no next question)");
            }
            print_current(session)?;
        }
        Command::Previous => {
            if !lock_session(session)?.previous_question()? {
                println!("(no previous question)");
            }
            print_current(session)?;
        }
        Command::Go(index) => {
            lock_session(session)?.go_to_question(index)?;
            print_current(session)?;
        }
        Command::Mark => {
            let question_id = current_question_id(session)?;
            let marked = lock_session(session)?.toggle_mark(question_id)?;
            println!("{}", if marked { "Marked for review." } else { "Mark removed." });
        }
        Command::Check => {
            let question_id = current_question_id(session)?;
            if !service.request_check(Arc::clone(session), question_id).await? {
                println!("(already checked)");
            }
            print_current(session)?;
        }
        Command::Pause => {
            let paused = lock_session(session)?.toggle_pause()?;
            println!("{}", if paused { "Paused." } else { "Running." });
        }
        Command::Submit => {
            if service.request_completion(Arc::clone(session)).await? {
                print_result(session)?;
            } else {
                println!("(already submitted)");
            }
        }
        Command::Retry => {
            if service.retry_grading(Arc::clone(session)).await? {
                print_result(session)?;
            } else {
                println!("(nothing to retry)");
            }
        }
        Command::Review { json } => {
            lock_session(session)?.open_review()?;
            let payload = service.review_payload(Arc::clone(session)).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&payload)?);
            } else {
                print_review(&payload);
            }
        }
        Command::Status => print_current(session)?,
        Command::Save => {
            service.save_and_exit(Arc::clone(session)).await?;
            println!("Saved. You can resume this exam later.");
            return Ok(Flow::Quit);
        }
        Command::Exit => {
            service.exit(Arc::clone(session)).await?;
            return Ok(Flow::Quit);
        }
        Command::Help => print_help(),
    }
    Ok(Flow::Continue)
}

fn current_question_id(
    session: &SharedSession,
) -> Result<exam_core::model::QuestionId, Box<dyn Error>> {
    lock_session(session)?
        .current_question()
        .map(exam_core::model::Question::id)
        .ok_or_else(|| "no question loaded".into())
}

//
// ─── RENDERING ─────────────────────────────────────────────────────────────────
//

fn print_help() {
    println!("Commands: a <A|1>  n  p  g <n>  m  c  pause  submit  retry  review [json]");
    println!("          status  save  exit  help");
}

fn answer_note(result: &SessionAnswerResult) -> Option<&'static str> {
    match result.change {
        AnswerChange::Locked => Some("question was checked; answer is locked"),
        AnswerChange::Cleared => Some("answer cleared"),
        AnswerChange::Updated(_) if !result.queued => Some("answer kept locally"),
        AnswerChange::Updated(_) => None,
    }
}

fn answer_labels(answer: &AnswerValue, options: &[QuestionOption]) -> String {
    answer
        .indices()
        .into_iter()
        .map(|i| {
            options
                .get(i)
                .map_or_else(|| QuestionOption::label_for(i), |o| o.label.clone())
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn print_current(session: &SharedSession) -> Result<(), Box<dyn Error>> {
    let controller = lock_session(session)?;
    let progress = controller.progress();
    match progress.state {
        SessionState::Completed => {
            println!("Exam submitted. Type `review` to see the breakdown.");
            return Ok(());
        }
        SessionState::Abandoned => {
            println!("Session closed.");
            return Ok(());
        }
        SessionState::Loading | SessionState::Active | SessionState::Paused => {}
    }
    let Some(question) = controller.current_question() else {
        return Ok(());
    };
    let id = question.id();

    let mut flags = Vec::new();
    if controller.is_marked(id) {
        flags.push("marked");
    }
    if controller.is_checked(id) {
        flags.push("checked");
    }
    if progress.is_paused {
        flags.push("PAUSED");
    }
    println!();
    println!(
        "Question {}/{}  [{} answered]  {} ({:?})  {}",
        progress.current_index + 1,
        progress.total,
        progress.answered,
        format_clock(progress.remaining_seconds),
        progress.urgency,
        flags.join(" "),
    );
    println!("{}", question.text());
    if question.is_multiple_choice() {
        println!("(choose {})", question.expected_answers());
    }

    let answer = controller.answer(id);
    for (i, option) in question.options().iter().enumerate() {
        let selected = answer.is_some_and(|a| a.contains(i));
        let mark = if selected { "x" } else { " " };
        println!("  [{mark}] {}. {}", option.label, option.text);
    }
    if !question.has_options() {
        println!("  (options unavailable; answer by letter)");
    }

    if let Some(checked) = controller.checked(id) {
        let verdict = match controller.is_correct(id) {
            Correctness::Correct => "Correct",
            Correctness::Incorrect => "Incorrect",
            Correctness::Unknown => "Unknown",
        };
        let expected = checked
            .correct_answer
            .as_ref()
            .map_or_else(|| "?".to_owned(), |a| answer_labels(a, question.options()));
        println!("  {verdict}. Correct answer: {expected}");
        println!("  {}", checked.explanation);
    }
    Ok(())
}

fn print_result(session: &SharedSession) -> Result<(), Box<dyn Error>> {
    let controller = lock_session(session)?;
    match controller.result_status() {
        Some(ResultStatus::Graded(result)) => {
            let stats = result.statistics();
            println!(
                "Score {:.1}% ({}) - {} correct, {} incorrect, {} unanswered",
                result.score(),
                if result.passed() { "passed" } else { "not passed" },
                stats.correct,
                stats.incorrect,
                stats.unanswered,
            );
        }
        Some(ResultStatus::Unavailable { reason }) => {
            println!("Results unavailable ({reason}). Type `retry` to ask again.");
        }
        Some(ResultStatus::Pending) | None => println!("Grading in progress."),
    }
    Ok(())
}

fn print_review(payload: &ReviewPayload) {
    println!(
        "{}: {} answered, {} marked, {} checked, {} spent",
        payload.title,
        payload.answered,
        payload.marked,
        payload.checked,
        format_clock(payload.time_spent_seconds),
    );
    if let Some(score) = payload.score {
        println!("Score {score:.1}% (passing {}%)", payload.passing_score);
    }
    if let Some(reason) = &payload.result_unavailable {
        println!("Results unavailable: {reason}");
    }
    if let Some(progress) = payload.failed_questions {
        println!(
            "Improved {} of {} ({:.0}%)",
            progress.improved,
            progress.improved + progress.still_struggling,
            progress.improvement_rate
        );
    }

    for (n, question) in payload.questions.iter().enumerate() {
        let verdict = match question.correctness {
            Correctness::Correct => "ok",
            Correctness::Incorrect => "x",
            Correctness::Unknown => "?",
        };
        println!();
        println!("{:>2}. [{verdict}] {}", n + 1, question.text);
        let yours = question
            .user_answer
            .as_ref()
            .map_or_else(|| "-".to_owned(), |a| answer_labels(a, &question.options));
        let correct = question
            .correct_answer
            .as_ref()
            .map_or_else(|| "?".to_owned(), |a| answer_labels(a, &question.options));
        println!("    yours: {yours}  correct: {correct}");
        if let Some(explanation) = &question.explanation {
            println!("    {explanation}");
        }
    }
}
