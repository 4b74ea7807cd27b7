//! Seed data for `--offline` runs.

use backend::InMemoryBackend;
use exam_core::model::{Question, QuestionId, QuestionOption};

fn options(texts: &[&str]) -> Vec<QuestionOption> {
    texts
        .iter()
        .enumerate()
        .map(|(i, text)| QuestionOption::new(QuestionOption::label_for(i), *text))
        .collect()
}

fn single(id: u64, text: &str, answers: &[&str]) -> Option<Question> {
    Question::single_choice(QuestionId::new(id), text, options(answers))
        .ok()
        .map(|q| q.with_category("Storage").with_difficulty("medium"))
}

pub fn backend() -> InMemoryBackend {
    let mut questions: Vec<Question> = [
        single(
            1,
            "Which service offers durable object storage with eleven nines of durability?",
            &["Amazon EBS", "Amazon S3", "Amazon EFS", "Instance store"],
        ),
        single(
            2,
            "Which storage class suits data accessed less than once a quarter but needing millisecond retrieval?",
            &["S3 Standard", "S3 Glacier Deep Archive", "S3 Glacier Instant Retrieval", "S3 One Zone-IA"],
        ),
        single(
            4,
            "Which feature protects S3 objects from accidental overwrite?",
            &["Versioning", "Transfer Acceleration", "Requester Pays", "Static website hosting"],
        ),
    ]
    .into_iter()
    .flatten()
    .collect();

    questions.extend(
        Question::multiple_choice(
            QuestionId::new(3),
            "Which two services can mount a shared POSIX file system from several EC2 instances?",
            options(&["Amazon EFS", "Amazon EBS (gp3)", "Amazon FSx for Lustre", "Amazon S3"]),
            2,
        )
        .ok(),
    );
    // Arrives without options; the review screen fetches them.
    questions.extend(
        Question::single_choice(
            QuestionId::new(5),
            "Which service caches S3 content at edge locations?",
            Vec::new(),
        )
        .ok(),
    );

    questions.sort_by_key(|q| q.id().value());

    let failed: Vec<Question> = questions
        .iter()
        .filter(|q| matches!(q.id().value(), 2 | 3))
        .cloned()
        .collect();

    InMemoryBackend::new()
        .with_questions(questions)
        .with_failed_questions(failed)
        .with_answer(QuestionId::new(1), vec![1], Some("S3 is designed for 99.999999999% durability."))
        .with_answer(QuestionId::new(2), vec![2], None)
        .with_answer(
            QuestionId::new(3),
            vec![0, 2],
            Some("EFS and FSx for Lustre are shared file systems; EBS volumes attach to one instance."),
        )
        .with_answer(QuestionId::new(4), vec![0], None)
        .with_answer(QuestionId::new(5), vec![1], Some("CloudFront is the CDN."))
        .with_hidden_options(
            QuestionId::new(5),
            options(&["AWS Global Accelerator", "Amazon CloudFront", "Route 53", "AWS Direct Connect"]),
        )
}
