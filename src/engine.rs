use serde::{Deserialize, Serialize};
use serde_json::json;

/// Stored sentinel for an exam the student did not attend.
pub const ABSENT_MARKER: f64 = -1.0;
/// Stored sentinel for an administratively excused exam (medical waiver etc.).
pub const EXCUSED_MARKER: f64 = -2.0;

/// One exam cell: a score, one of the two attendance sentinels, or not
/// entered yet. The store keeps these as a nullable REAL with -1/-2 markers;
/// everything past the load boundary works on this enum instead.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Mark {
    Score(f64),
    Absent,
    Excused,
    Unset,
}

impl Mark {
    pub fn from_stored(raw: Option<f64>) -> Mark {
        match raw {
            None => Mark::Unset,
            Some(v) if v == ABSENT_MARKER => Mark::Absent,
            Some(v) if v == EXCUSED_MARKER => Mark::Excused,
            Some(v) => Mark::Score(v),
        }
    }

    pub fn to_stored(self) -> Option<f64> {
        match self {
            Mark::Score(v) => Some(v),
            Mark::Absent => Some(ABSENT_MARKER),
            Mark::Excused => Some(EXCUSED_MARKER),
            Mark::Unset => None,
        }
    }

    /// Wire form: number, "absent", "excused", or null.
    pub fn to_json(self) -> serde_json::Value {
        match self {
            Mark::Score(v) => json!(v),
            Mark::Absent => json!("absent"),
            Mark::Excused => json!("excused"),
            Mark::Unset => serde_json::Value::Null,
        }
    }
}

/// Raw per-student, per-subject input. Owned by the student record; the
/// attendance subsystem writes the sentinels, teachers write the scores.
#[derive(Debug, Clone, PartialEq)]
pub struct SubjectGrade {
    pub subject_id: String,
    pub subject_name: String,
    pub first_term: Mark,
    pub mid_year: Mark,
    pub second_term: Mark,
    pub final_exam_1st: Mark,
    pub final_exam_2nd: Mark,
}

/// Derived per-subject output. Never persisted as ground truth; recomputed
/// from the SubjectGrade plus policy on every call.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CalculatedGrade {
    pub subject_id: String,
    pub subject_name: String,
    pub annual_pursuit: Option<i64>,
    pub final_grade_1st: Option<i64>,
    pub decision_applied: i64,
    pub final_grade_with_decision: Option<i64>,
    pub final_grade_2nd: Option<i64>,
    pub is_exempt: bool,
}

impl CalculatedGrade {
    /// The mark that counts for the subject right now: the completion-round
    /// final when one exists, otherwise the first-round final after decision.
    pub fn effective_final(&self) -> Option<i64> {
        self.final_grade_2nd.or(self.final_grade_with_decision)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradingPolicy {
    pub pass_threshold: i64,
    pub max_total_decision_points: i64,
    pub max_subjects_eligible_for_decision: i64,
    pub points_per_subject_cap: i64,
}

impl Default for GradingPolicy {
    fn default() -> Self {
        Self {
            pass_threshold: 50,
            max_total_decision_points: 5,
            max_subjects_eligible_for_decision: 3,
            points_per_subject_cap: 5,
        }
    }
}

impl GradingPolicy {
    /// Misconfiguration is fatal at load/update time, never mid-computation.
    pub fn validate(&self) -> Result<(), String> {
        if !(1..=100).contains(&self.pass_threshold) {
            return Err(format!(
                "passThreshold must be in 1..=100, got {}",
                self.pass_threshold
            ));
        }
        if self.max_total_decision_points < 0 {
            return Err(format!(
                "maxTotalDecisionPoints must be >= 0, got {}",
                self.max_total_decision_points
            ));
        }
        if self.max_subjects_eligible_for_decision < 0 {
            return Err(format!(
                "maxSubjectsEligibleForDecision must be >= 0, got {}",
                self.max_subjects_eligible_for_decision
            ));
        }
        if self.points_per_subject_cap < 0 {
            return Err(format!(
                "pointsPerSubjectCap must be >= 0, got {}",
                self.points_per_subject_cap
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Status {
    Pass,
    Fail,
    MustSitCompletion,
    Pending,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentResult {
    pub status: Status,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Round {
    First,
    Completion,
}

/// Round-half-up to the nearest integer. Applied once at each aggregation
/// step and never re-applied to an already-rounded value.
pub fn round_half_up(x: f64) -> i64 {
    (x + 0.5).floor() as i64
}

/// Scores outside [0,100] are rejected at the entry boundary; if one slips
/// through (hand-edited store), clamp and flag rather than silently accept.
fn clamp_score(v: f64, field: &str) -> f64 {
    if (0.0..=100.0).contains(&v) {
        v
    } else {
        log::warn!("out-of-range {} score {} clamped to [0,100]", field, v);
        v.clamp(0.0, 100.0)
    }
}

/// Term aggregation: raw marks -> annual pursuit and first-round final.
/// Decision fields are left zeroed; `allocate_decision_points` fills them.
pub fn compute_subject(grade: &SubjectGrade) -> CalculatedGrade {
    let mut out = CalculatedGrade {
        subject_id: grade.subject_id.clone(),
        subject_name: grade.subject_name.clone(),
        annual_pursuit: None,
        final_grade_1st: None,
        decision_applied: 0,
        final_grade_with_decision: None,
        final_grade_2nd: None,
        is_exempt: false,
    };

    let pursuit = [grade.first_term, grade.mid_year, grade.second_term];

    // An excused exam removes the subject from pass/fail accounting entirely.
    if pursuit.iter().any(|m| *m == Mark::Excused) || grade.final_exam_1st == Mark::Excused {
        out.is_exempt = true;
        return out;
    }

    // Absence in a pursuit term fails the whole subject. A zero-equivalent
    // (never None) keeps the student out of Pending.
    if pursuit.iter().any(|m| *m == Mark::Absent) {
        out.annual_pursuit = Some(0);
        out.final_grade_1st = Some(0);
        return out;
    }

    let mut sum = 0.0;
    let mut complete = true;
    for (mark, field) in pursuit
        .iter()
        .zip(["firstTerm", "midYear", "secondTerm"])
    {
        match mark {
            Mark::Score(v) => sum += clamp_score(*v, field),
            // Absent and Excused were handled above; only Unset remains.
            _ => complete = false,
        }
    }
    if complete {
        out.annual_pursuit = Some(round_half_up(sum / 3.0));
    }

    if let Some(pursuit_avg) = out.annual_pursuit {
        let exam = match grade.final_exam_1st {
            Mark::Score(v) => Some(clamp_score(v, "finalExam1st")),
            Mark::Absent => Some(0.0),
            Mark::Unset | Mark::Excused => None,
        };
        if let Some(exam) = exam {
            out.final_grade_1st = Some(round_half_up((pursuit_avg as f64 + exam) / 2.0));
        }
    }

    out
}

/// Distribute the grace-point pool across failing subjects, cheapest deficit
/// first, ties by subject order. Grants cover a deficit fully or not at all;
/// a partial grant that still leaves the subject failing would waste pool.
/// Only triggered when the student has at least one passing and one failing
/// subject in the first round.
pub fn allocate_decision_points(grades: &mut [CalculatedGrade], policy: &GradingPolicy) {
    for g in grades.iter_mut() {
        if !g.is_exempt {
            g.final_grade_with_decision = g.final_grade_1st;
        }
    }

    let mut failing: Vec<(usize, i64)> = Vec::new();
    let mut has_passing = false;
    for (i, g) in grades.iter().enumerate() {
        if g.is_exempt {
            continue;
        }
        match g.final_grade_1st {
            Some(v) if v < policy.pass_threshold => {
                failing.push((i, policy.pass_threshold - v));
            }
            Some(_) => has_passing = true,
            None => {}
        }
    }
    if failing.is_empty() || !has_passing {
        return;
    }

    failing.sort_by_key(|&(i, deficit)| (deficit, i));

    let mut granted_subjects = 0_i64;
    let mut granted_total = 0_i64;
    for (i, deficit) in failing {
        if granted_subjects >= policy.max_subjects_eligible_for_decision {
            break;
        }
        // Sorted ascending: once one deficit is out of reach, so are the rest.
        if deficit > policy.points_per_subject_cap {
            break;
        }
        if granted_total + deficit > policy.max_total_decision_points {
            break;
        }
        let g = &mut grades[i];
        g.decision_applied = deficit;
        g.final_grade_with_decision = g.final_grade_1st.map(|v| v + deficit);
        granted_subjects += 1;
        granted_total += deficit;
    }
}

/// Promotion state machine over one student's subjects.
pub fn classify_student(
    grades: &[CalculatedGrade],
    policy: &GradingPolicy,
    round: Round,
) -> StudentResult {
    let gradable: Vec<&CalculatedGrade> = grades.iter().filter(|g| !g.is_exempt).collect();

    // A student with nothing to pass cannot Pass.
    if gradable.is_empty() {
        return StudentResult {
            status: Status::Pending,
            message: "No gradable subjects entered yet.".to_string(),
        };
    }

    let mut pending_count = 0_usize;
    let mut failing: Vec<&str> = Vec::new();
    for g in &gradable {
        let final_mark = match round {
            Round::First => g.final_grade_with_decision,
            Round::Completion => g.effective_final(),
        };
        match final_mark {
            None => pending_count += 1,
            Some(v) if v < policy.pass_threshold => failing.push(&g.subject_name),
            Some(_) => {}
        }
    }

    match round {
        Round::First => {
            if pending_count > 0 {
                StudentResult {
                    status: Status::Pending,
                    message: format!(
                        "Awaiting first-round grade entry in {} subject(s).",
                        pending_count
                    ),
                }
            } else if failing.is_empty() {
                StudentResult {
                    status: Status::Pass,
                    message: "Promoted: all subjects passed.".to_string(),
                }
            } else if failing.len() as i64 <= policy.max_subjects_eligible_for_decision {
                StudentResult {
                    status: Status::MustSitCompletion,
                    message: format!("Must sit completion exams in: {}.", failing.join(", ")),
                }
            } else {
                StudentResult {
                    status: Status::Fail,
                    message: format!(
                        "Year failed: {} failing subjects exceeds the completion cap of {}.",
                        failing.len(),
                        policy.max_subjects_eligible_for_decision
                    ),
                }
            }
        }
        // The completion round is terminal: an unsat exam keeps the failing
        // first-round final, so nothing can stay Pending here.
        Round::Completion => {
            if failing.is_empty() && pending_count == 0 {
                StudentResult {
                    status: Status::Pass,
                    message: "Promoted after completion exams.".to_string(),
                }
            } else {
                let mut names: Vec<String> = failing.iter().map(|s| s.to_string()).collect();
                if pending_count > 0 {
                    names.push(format!("{} ungraded subject(s)", pending_count));
                }
                StudentResult {
                    status: Status::Fail,
                    message: format!("Year failed after completion exams: {}.", names.join(", ")),
                }
            }
        }
    }
}

/// Completion exams fully replace the first-round final for the subjects that
/// were still failing — no averaging with prior terms.
pub fn resolve_completion(
    calculated: &mut [CalculatedGrade],
    grades: &[SubjectGrade],
    policy: &GradingPolicy,
) {
    for g in calculated.iter_mut() {
        if g.is_exempt {
            continue;
        }
        let failing = matches!(g.final_grade_with_decision, Some(v) if v < policy.pass_threshold);
        if !failing {
            continue;
        }
        let mark = grades
            .iter()
            .find(|raw| raw.subject_id == g.subject_id)
            .map(|raw| raw.final_exam_2nd)
            .unwrap_or(Mark::Unset);
        match mark {
            Mark::Score(v) => {
                g.final_grade_2nd = Some(round_half_up(clamp_score(v, "finalExam2nd")));
            }
            Mark::Absent => g.final_grade_2nd = Some(0),
            Mark::Excused => g.is_exempt = true,
            Mark::Unset => {}
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentComputation {
    pub subjects: Vec<CalculatedGrade>,
    /// Classification before any completion exam is considered.
    pub first_round: StudentResult,
    /// Final classification; equals `first_round` until a completion score
    /// for a failing subject exists.
    pub result: StudentResult,
}

/// The full pipeline for one student: aggregate terms, allocate grace points,
/// classify, and fold in completion-exam scores when the student must sit
/// them and at least one has been entered. Pure in its inputs.
pub fn compute_student(grades: &[SubjectGrade], policy: &GradingPolicy) -> StudentComputation {
    let mut subjects: Vec<CalculatedGrade> = grades.iter().map(compute_subject).collect();
    allocate_decision_points(&mut subjects, policy);
    let first_round = classify_student(&subjects, policy, Round::First);

    let mut result = first_round.clone();
    if first_round.status == Status::MustSitCompletion {
        let any_second_entered = subjects.iter().any(|g| {
            !g.is_exempt
                && matches!(g.final_grade_with_decision, Some(v) if v < policy.pass_threshold)
                && grades
                    .iter()
                    .find(|raw| raw.subject_id == g.subject_id)
                    .map(|raw| raw.final_exam_2nd != Mark::Unset)
                    .unwrap_or(false)
        });
        if any_second_entered {
            resolve_completion(&mut subjects, grades, policy);
            result = classify_student(&subjects, policy, Round::Completion);
        }
    }

    StudentComputation {
        subjects,
        first_round,
        result,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectStatistics {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub pass_rate: i64,
}

/// Per-subject class statistics. Exempt and ungraded entries are excluded
/// from both numerator and denominator.
pub fn subject_statistics(grades: &[CalculatedGrade], policy: &GradingPolicy) -> SubjectStatistics {
    let mut total = 0_usize;
    let mut passed = 0_usize;
    for g in grades {
        if g.is_exempt {
            continue;
        }
        let Some(v) = g.effective_final() else {
            continue;
        };
        total += 1;
        if v >= policy.pass_threshold {
            passed += 1;
        }
    }
    let pass_rate = if total == 0 {
        0
    } else {
        round_half_up(100.0 * passed as f64 / total as f64)
    };
    SubjectStatistics {
        total,
        passed,
        failed: total - passed,
        pass_rate,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subject(name: &str, marks: [Mark; 5]) -> SubjectGrade {
        SubjectGrade {
            subject_id: format!("id-{}", name),
            subject_name: name.to_string(),
            first_term: marks[0],
            mid_year: marks[1],
            second_term: marks[2],
            final_exam_1st: marks[3],
            final_exam_2nd: marks[4],
        }
    }

    fn scored(name: &str, t1: f64, t2: f64, t3: f64, exam: f64) -> SubjectGrade {
        subject(
            name,
            [
                Mark::Score(t1),
                Mark::Score(t2),
                Mark::Score(t3),
                Mark::Score(exam),
                Mark::Unset,
            ],
        )
    }

    #[test]
    fn round_half_up_at_boundaries() {
        assert_eq!(round_half_up(0.0), 0);
        assert_eq!(round_half_up(54.5), 55);
        assert_eq!(round_half_up(54.49), 54);
        assert_eq!(round_half_up(69.5), 70);
        assert_eq!(round_half_up(100.0), 100);
    }

    #[test]
    fn pursuit_and_first_round_final() {
        // 60/70/80 -> pursuit 70; exam 40 -> final round((70+40)/2) = 55.
        let g = compute_subject(&scored("Math", 60.0, 70.0, 80.0, 40.0));
        assert_eq!(g.annual_pursuit, Some(70));
        assert_eq!(g.final_grade_1st, Some(55));
        assert!(!g.is_exempt);
    }

    #[test]
    fn rounding_applied_once_per_step() {
        // 61/61/62 -> mean 61.333 -> 61 (not 62 via re-rounding a rounded mean).
        // Final: (61 + 62) / 2 = 61.5 -> 62.
        let g = compute_subject(&scored("Science", 61.0, 61.0, 62.0, 62.0));
        assert_eq!(g.annual_pursuit, Some(61));
        assert_eq!(g.final_grade_1st, Some(62));
    }

    #[test]
    fn missing_term_leaves_pursuit_unset() {
        let g = compute_subject(&subject(
            "History",
            [
                Mark::Score(60.0),
                Mark::Unset,
                Mark::Score(80.0),
                Mark::Score(90.0),
                Mark::Unset,
            ],
        ));
        assert_eq!(g.annual_pursuit, None);
        assert_eq!(g.final_grade_1st, None);
    }

    #[test]
    fn missing_exam_leaves_final_unset() {
        let g = compute_subject(&subject(
            "History",
            [
                Mark::Score(60.0),
                Mark::Score(70.0),
                Mark::Score(80.0),
                Mark::Unset,
                Mark::Unset,
            ],
        ));
        assert_eq!(g.annual_pursuit, Some(70));
        assert_eq!(g.final_grade_1st, None);
    }

    #[test]
    fn absent_term_fails_subject_with_zero_equivalent() {
        let g = compute_subject(&subject(
            "Sport",
            [
                Mark::Absent,
                Mark::Score(90.0),
                Mark::Score(90.0),
                Mark::Score(100.0),
                Mark::Unset,
            ],
        ));
        assert!(!g.is_exempt);
        assert_eq!(g.annual_pursuit, Some(0));
        assert_eq!(g.final_grade_1st, Some(0));
    }

    #[test]
    fn absent_final_exam_counts_as_zero_score() {
        let g = compute_subject(&subject(
            "Art",
            [
                Mark::Score(80.0),
                Mark::Score(80.0),
                Mark::Score(80.0),
                Mark::Absent,
                Mark::Unset,
            ],
        ));
        assert_eq!(g.annual_pursuit, Some(80));
        assert_eq!(g.final_grade_1st, Some(40));
    }

    #[test]
    fn excused_marks_subject_exempt() {
        let g = compute_subject(&subject(
            "Music",
            [
                Mark::Excused,
                Mark::Score(90.0),
                Mark::Score(90.0),
                Mark::Score(90.0),
                Mark::Unset,
            ],
        ));
        assert!(g.is_exempt);
        assert_eq!(g.annual_pursuit, None);
        assert_eq!(g.final_grade_1st, None);
    }

    #[test]
    fn passing_subject_is_never_selected_by_allocator() {
        let policy = GradingPolicy::default();
        let mut grades = vec![
            compute_subject(&scored("Math", 60.0, 70.0, 80.0, 40.0)), // final 55
            compute_subject(&scored("Science", 40.0, 40.0, 40.0, 40.0)), // final 40
        ];
        allocate_decision_points(&mut grades, &policy);
        assert_eq!(grades[0].decision_applied, 0);
        assert_eq!(grades[0].final_grade_with_decision, Some(55));
    }

    #[test]
    fn deficit_fully_covered_within_pool() {
        // Final 47, deficit 3, pool 5 -> grant exactly 3.
        let policy = GradingPolicy::default();
        let mut grades = vec![
            compute_subject(&scored("Math", 47.0, 47.0, 47.0, 47.0)),
            compute_subject(&scored("Science", 80.0, 80.0, 80.0, 80.0)),
        ];
        allocate_decision_points(&mut grades, &policy);
        assert_eq!(grades[0].decision_applied, 3);
        assert_eq!(grades[0].final_grade_with_decision, Some(50));

        let result = classify_student(&grades, &policy, Round::First);
        assert_eq!(result.status, Status::Pass);
    }

    #[test]
    fn all_failing_student_gets_no_grace_points() {
        let policy = GradingPolicy::default();
        let mut grades = vec![
            compute_subject(&scored("Math", 47.0, 47.0, 47.0, 47.0)),
            compute_subject(&scored("Science", 48.0, 48.0, 48.0, 48.0)),
        ];
        allocate_decision_points(&mut grades, &policy);
        assert_eq!(grades[0].decision_applied, 0);
        assert_eq!(grades[1].decision_applied, 0);
        assert_eq!(grades[0].final_grade_with_decision, Some(47));
    }

    #[test]
    fn no_partial_grants_when_deficit_exceeds_cap() {
        let policy = GradingPolicy {
            points_per_subject_cap: 5,
            ..GradingPolicy::default()
        };
        // Deficit 10 > cap 5: nothing granted, not 5 of 10.
        let mut grades = vec![
            compute_subject(&scored("Math", 40.0, 40.0, 40.0, 40.0)),
            compute_subject(&scored("Science", 80.0, 80.0, 80.0, 80.0)),
        ];
        allocate_decision_points(&mut grades, &policy);
        assert_eq!(grades[0].decision_applied, 0);
        assert_eq!(grades[0].final_grade_with_decision, Some(40));
    }

    #[test]
    fn pool_is_conserved_across_subjects() {
        let policy = GradingPolicy {
            max_total_decision_points: 5,
            max_subjects_eligible_for_decision: 3,
            points_per_subject_cap: 5,
            ..GradingPolicy::default()
        };
        // Deficits 2, 2, 2: the third grant would take the total to 6.
        let mut grades = vec![
            compute_subject(&scored("A", 48.0, 48.0, 48.0, 48.0)),
            compute_subject(&scored("B", 48.0, 48.0, 48.0, 48.0)),
            compute_subject(&scored("C", 48.0, 48.0, 48.0, 48.0)),
            compute_subject(&scored("D", 80.0, 80.0, 80.0, 80.0)),
        ];
        allocate_decision_points(&mut grades, &policy);
        let total: i64 = grades.iter().map(|g| g.decision_applied).sum();
        let granted = grades.iter().filter(|g| g.decision_applied > 0).count();
        assert_eq!(total, 4);
        assert_eq!(granted, 2);
        // Ties broken by subject order: A and B, never C.
        assert_eq!(grades[0].decision_applied, 2);
        assert_eq!(grades[1].decision_applied, 2);
        assert_eq!(grades[2].decision_applied, 0);
    }

    #[test]
    fn cheapest_deficit_rescued_first() {
        let policy = GradingPolicy {
            max_total_decision_points: 3,
            max_subjects_eligible_for_decision: 3,
            points_per_subject_cap: 5,
            ..GradingPolicy::default()
        };
        let mut grades = vec![
            compute_subject(&scored("A", 46.0, 46.0, 46.0, 46.0)), // deficit 4
            compute_subject(&scored("B", 48.0, 48.0, 48.0, 48.0)), // deficit 2
            compute_subject(&scored("C", 80.0, 80.0, 80.0, 80.0)),
        ];
        allocate_decision_points(&mut grades, &policy);
        assert_eq!(grades[0].decision_applied, 0);
        assert_eq!(grades[1].decision_applied, 2);
    }

    #[test]
    fn pending_when_any_subject_incomplete() {
        let policy = GradingPolicy::default();
        let mut grades = vec![
            compute_subject(&scored("Math", 90.0, 90.0, 90.0, 90.0)),
            compute_subject(&subject(
                "Science",
                [
                    Mark::Score(90.0),
                    Mark::Score(90.0),
                    Mark::Score(90.0),
                    Mark::Unset,
                    Mark::Unset,
                ],
            )),
        ];
        allocate_decision_points(&mut grades, &policy);
        let result = classify_student(&grades, &policy, Round::First);
        assert_eq!(result.status, Status::Pending);
    }

    #[test]
    fn must_sit_completion_names_failing_subjects() {
        let policy = GradingPolicy::default();
        let mut grades = vec![
            compute_subject(&scored("Math", 40.0, 40.0, 40.0, 40.0)),
            compute_subject(&scored("Science", 80.0, 80.0, 80.0, 80.0)),
        ];
        allocate_decision_points(&mut grades, &policy);
        let result = classify_student(&grades, &policy, Round::First);
        assert_eq!(result.status, Status::MustSitCompletion);
        assert!(result.message.contains("Math"));
    }

    #[test]
    fn four_failing_subjects_exceed_completion_cap() {
        let policy = GradingPolicy::default(); // cap 3
        let mut grades = vec![
            compute_subject(&scored("A", 30.0, 30.0, 30.0, 30.0)),
            compute_subject(&scored("B", 30.0, 30.0, 30.0, 30.0)),
            compute_subject(&scored("C", 30.0, 30.0, 30.0, 30.0)),
            compute_subject(&scored("D", 30.0, 30.0, 30.0, 30.0)),
            compute_subject(&scored("E", 80.0, 80.0, 80.0, 80.0)),
        ];
        allocate_decision_points(&mut grades, &policy);
        let result = classify_student(&grades, &policy, Round::First);
        assert_eq!(result.status, Status::Fail);
    }

    #[test]
    fn no_subjects_yields_pending() {
        let policy = GradingPolicy::default();
        let result = classify_student(&[], &policy, Round::First);
        assert_eq!(result.status, Status::Pending);
    }

    #[test]
    fn all_exempt_yields_pending() {
        let policy = GradingPolicy::default();
        let grades = vec![compute_subject(&subject(
            "Music",
            [
                Mark::Excused,
                Mark::Unset,
                Mark::Unset,
                Mark::Unset,
                Mark::Unset,
            ],
        ))];
        let result = classify_student(&grades, &policy, Round::First);
        assert_eq!(result.status, Status::Pending);
    }

    #[test]
    fn completion_score_replaces_first_round_final() {
        let policy = GradingPolicy::default();
        let raw = vec![
            subject(
                "Math",
                [
                    Mark::Score(40.0),
                    Mark::Score(40.0),
                    Mark::Score(40.0),
                    Mark::Score(40.0),
                    Mark::Score(62.0),
                ],
            ),
            scored("Science", 80.0, 80.0, 80.0, 80.0),
        ];
        let computation = compute_student(&raw, &policy);
        assert_eq!(computation.first_round.status, Status::MustSitCompletion);
        assert_eq!(computation.subjects[0].final_grade_2nd, Some(62));
        assert_eq!(computation.result.status, Status::Pass);
        // Untouched subject keeps its first-round final.
        assert_eq!(computation.subjects[1].final_grade_2nd, None);
    }

    #[test]
    fn absent_from_completion_exam_fails() {
        let policy = GradingPolicy::default();
        let raw = vec![
            subject(
                "Math",
                [
                    Mark::Score(40.0),
                    Mark::Score(40.0),
                    Mark::Score(40.0),
                    Mark::Score(40.0),
                    Mark::Absent,
                ],
            ),
            scored("Science", 80.0, 80.0, 80.0, 80.0),
        ];
        let computation = compute_student(&raw, &policy);
        assert_eq!(computation.subjects[0].final_grade_2nd, Some(0));
        assert_eq!(computation.result.status, Status::Fail);
    }

    #[test]
    fn completion_not_resolved_until_a_score_exists() {
        let policy = GradingPolicy::default();
        let raw = vec![
            scored("Math", 40.0, 40.0, 40.0, 40.0),
            scored("Science", 80.0, 80.0, 80.0, 80.0),
        ];
        let computation = compute_student(&raw, &policy);
        assert_eq!(computation.result.status, Status::MustSitCompletion);
    }

    #[test]
    fn compute_student_is_idempotent() {
        let policy = GradingPolicy::default();
        let raw = vec![
            scored("Math", 47.0, 47.0, 47.0, 47.0),
            scored("Science", 80.0, 80.0, 80.0, 80.0),
        ];
        let a = compute_student(&raw, &policy);
        let b = compute_student(&raw, &policy);
        assert_eq!(a, b);
    }

    #[test]
    fn raising_a_term_never_lowers_the_final() {
        let policy = GradingPolicy::default();
        let mut previous = None;
        for t1 in (30..=90).step_by(5) {
            let raw = vec![
                scored("Math", t1 as f64, 50.0, 50.0, 50.0),
                scored("Science", 80.0, 80.0, 80.0, 80.0),
            ];
            let computation = compute_student(&raw, &policy);
            let final_mark = computation.subjects[0].final_grade_with_decision;
            if let (Some(prev), Some(cur)) = (previous, final_mark) {
                assert!(cur >= prev, "final dropped from {} to {}", prev, cur);
            }
            previous = final_mark;
        }
    }

    #[test]
    fn class_statistics_exclude_exempt_students() {
        let policy = GradingPolicy::default();
        // 6 pass, 2 fail, 2 exempt -> total 8, rate 75.
        let mut grades: Vec<CalculatedGrade> = Vec::new();
        for _ in 0..6 {
            let mut g = vec![compute_subject(&scored("Math", 80.0, 80.0, 80.0, 80.0))];
            allocate_decision_points(&mut g, &policy);
            grades.push(g.remove(0));
        }
        for _ in 0..2 {
            let mut g = vec![compute_subject(&scored("Math", 30.0, 30.0, 30.0, 30.0))];
            allocate_decision_points(&mut g, &policy);
            grades.push(g.remove(0));
        }
        for _ in 0..2 {
            grades.push(compute_subject(&subject(
                "Math",
                [
                    Mark::Excused,
                    Mark::Unset,
                    Mark::Unset,
                    Mark::Unset,
                    Mark::Unset,
                ],
            )));
        }
        let stats = subject_statistics(&grades, &policy);
        assert_eq!(stats.total, 8);
        assert_eq!(stats.passed, 6);
        assert_eq!(stats.failed, 2);
        assert_eq!(stats.pass_rate, 75);
    }

    #[test]
    fn empty_class_has_zero_pass_rate() {
        let stats = subject_statistics(&[], &GradingPolicy::default());
        assert_eq!(stats.total, 0);
        assert_eq!(stats.pass_rate, 0);
    }

    #[test]
    fn policy_validation_rejects_bad_values() {
        let mut policy = GradingPolicy::default();
        assert!(policy.validate().is_ok());
        policy.max_total_decision_points = -1;
        assert!(policy.validate().is_err());

        let mut policy = GradingPolicy::default();
        policy.pass_threshold = 0;
        assert!(policy.validate().is_err());
        policy.pass_threshold = 101;
        assert!(policy.validate().is_err());
    }

    #[test]
    fn stored_sentinel_round_trip() {
        assert_eq!(Mark::from_stored(None), Mark::Unset);
        assert_eq!(Mark::from_stored(Some(-1.0)), Mark::Absent);
        assert_eq!(Mark::from_stored(Some(-2.0)), Mark::Excused);
        assert_eq!(Mark::from_stored(Some(87.0)), Mark::Score(87.0));
        assert_eq!(Mark::Absent.to_stored(), Some(ABSENT_MARKER));
        assert_eq!(Mark::Unset.to_stored(), None);
    }
}
