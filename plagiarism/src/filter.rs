//! Selection of the participations a check compares.

use crate::model::{Candidate, ExerciseKind, ParticipationRecord};
use crate::options::CheckOptions;
use db::models::participation::Role;

/// Whether `score` passes `minimum_score`. A minimum of 0 keeps everything,
/// including unassessed submissions; otherwise a score is required.
pub fn meets_minimum_score(score: Option<f64>, minimum_score: u32) -> bool {
    minimum_score == 0 || score.is_some_and(|s| s >= f64::from(minimum_score))
}

/// Filters participations down to the ones worth comparing.
///
/// Keeps graded student (or team) participations that have a latest submission
/// with content and a sufficient score. For text exercises the word-count
/// minimum is applied here; for programming exercises the token minimum is
/// checked after checkout. Input order is preserved.
pub fn select_eligible(
    records: Vec<ParticipationRecord>,
    kind: &ExerciseKind,
    options: &CheckOptions,
) -> Vec<Candidate> {
    records
        .into_iter()
        .filter(|r| !r.practice_mode)
        .filter(|r| r.team_based || r.role == Role::Student)
        .filter_map(|r| {
            let submission = r.latest_submission?;
            Some(Candidate {
                participation_id: r.participation_id,
                participant: r.participant,
                repository_uri: r.repository_uri,
                submission,
            })
        })
        .filter(|c| has_content(c, kind))
        .filter(|c| meets_minimum_score(c.submission.score, options.minimum_score))
        .filter(|c| match kind {
            ExerciseKind::Text => c.submission.word_count() >= options.minimum_size as usize,
            ExerciseKind::Programming { .. } => true,
        })
        .collect()
}

fn has_content(c: &Candidate, kind: &ExerciseKind) -> bool {
    match kind {
        ExerciseKind::Programming { .. } => c
            .repository_uri
            .as_deref()
            .is_some_and(|u| !u.trim().is_empty()),
        ExerciseKind::Text => c
            .submission
            .text
            .as_deref()
            .is_some_and(|t| !t.trim().is_empty()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SubmissionSnapshot;
    use chrono::Utc;
    use util::languages::Language;

    fn programming() -> ExerciseKind {
        ExerciseKind::Programming {
            language: Language::Java,
            project_key: "P".into(),
            template_uri: None,
        }
    }

    fn record(id: i64, score: Option<f64>) -> ParticipationRecord {
        ParticipationRecord {
            participation_id: id,
            participant: Some(format!("student{id}")),
            role: Role::Student,
            team_based: false,
            practice_mode: false,
            repository_uri: Some(format!("https://git.example.org/p/p-student{id}.git")),
            latest_submission: Some(SubmissionSnapshot {
                id: id * 10,
                text: Some("one two three four five".into()),
                score,
                submitted_at: Utc::now(),
            }),
        }
    }

    fn ids(c: &[Candidate]) -> Vec<i64> {
        c.iter().map(|c| c.participation_id).collect()
    }

    #[test]
    fn minimum_score_keeps_only_scores_at_or_above() {
        let records = [0.0, 40.0, 60.0, 80.0, 100.0]
            .into_iter()
            .enumerate()
            .map(|(i, s)| record(i as i64 + 1, Some(s)))
            .collect();
        let opts = CheckOptions { minimum_score: 50, ..Default::default() };

        let got = select_eligible(records, &programming(), &opts);
        let scores: Vec<f64> = got.iter().filter_map(|c| c.submission.score).collect();
        assert_eq!(scores, vec![60.0, 80.0, 100.0]);
    }

    #[test]
    fn zero_minimum_score_keeps_unassessed() {
        let got = select_eligible(vec![record(1, None)], &programming(), &CheckOptions::default());
        assert_eq!(ids(&got), vec![1]);

        let opts = CheckOptions { minimum_score: 1, ..Default::default() };
        assert!(select_eligible(vec![record(1, None)], &programming(), &opts).is_empty());
    }

    #[test]
    fn practice_privileged_and_empty_participations_are_dropped() {
        let mut practice = record(1, Some(90.0));
        practice.practice_mode = true;

        let mut tutor = record(2, Some(90.0));
        tutor.role = Role::Tutor;

        let mut tutor_team = record(3, Some(90.0));
        tutor_team.role = Role::Tutor;
        tutor_team.team_based = true;

        let mut no_submission = record(4, Some(90.0));
        no_submission.latest_submission = None;

        let mut no_repo = record(5, Some(90.0));
        no_repo.repository_uri = None;

        let keep = record(6, Some(90.0));

        let got = select_eligible(
            vec![practice, tutor, tutor_team, no_submission, no_repo, keep],
            &programming(),
            &CheckOptions::default(),
        );
        assert_eq!(ids(&got), vec![3, 6]);
    }

    #[test]
    fn text_minimum_size_counts_words() {
        let mut short = record(1, None);
        short.latest_submission.as_mut().unwrap().text = Some("too short".into());
        let mut blank = record(2, None);
        blank.latest_submission.as_mut().unwrap().text = Some("   ".into());
        let long = record(3, None);

        let opts = CheckOptions { minimum_size: 5, ..Default::default() };
        let got = select_eligible(vec![short, blank, long], &ExerciseKind::Text, &opts);
        assert_eq!(ids(&got), vec![3]);
    }

    #[test]
    fn programming_size_is_not_checked_eagerly() {
        let opts = CheckOptions { minimum_size: 10_000, ..Default::default() };
        let got = select_eligible(vec![record(1, None)], &programming(), &opts);
        assert_eq!(ids(&got), vec![1]);
    }
}
