//! Task metrics: accuracy/F1, MAE/RMSE and ROUGE.

use std::collections::{BTreeMap, HashMap};

use crate::task::{Task, TaskKind};

/// Lowest and highest rating on the LaMP-3 scale.
pub const RATING_MIN: f64 = 1.0;
pub const RATING_MAX: f64 = 5.0;

/// Numeric value of a rating prediction.
///
/// Unparsable predictions map to the scale boundary *farther* from the
/// target. Note that this maximizes the penalty for malformed output; it is
/// kept exactly as the benchmark's reference scoring does it.
pub fn rating_value(prediction: &str, target: f64) -> f64 {
    match prediction.trim().parse::<f64>() {
        Ok(v) => v,
        Err(_) => {
            if (RATING_MIN - target).abs() > (RATING_MAX - target).abs() {
                RATING_MIN
            } else {
                RATING_MAX
            }
        }
    }
}

/// ROUGE tokenization: lowercase, split on anything that is not `[a-z0-9]`.
pub fn rouge_tokens(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !(c.is_ascii_lowercase() || c.is_ascii_digit()))
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

fn f_measure(overlap: usize, pred_len: usize, ref_len: usize) -> f64 {
    if overlap == 0 || pred_len == 0 || ref_len == 0 {
        return 0.0;
    }
    let precision = overlap as f64 / pred_len as f64;
    let recall = overlap as f64 / ref_len as f64;
    2.0 * precision * recall / (precision + recall)
}

/// Unigram-overlap F-measure between one prediction and one reference.
pub fn rouge1(prediction: &str, reference: &str) -> f64 {
    let pred = rouge_tokens(prediction);
    let refs = rouge_tokens(reference);

    let mut ref_counts: HashMap<&str, usize> = HashMap::new();
    for t in &refs {
        *ref_counts.entry(t.as_str()).or_default() += 1;
    }
    let mut pred_counts: HashMap<&str, usize> = HashMap::new();
    for t in &pred {
        *pred_counts.entry(t.as_str()).or_default() += 1;
    }
    let overlap = pred_counts
        .iter()
        .map(|(t, &c)| c.min(ref_counts.get(t).copied().unwrap_or(0)))
        .sum();

    f_measure(overlap, pred.len(), refs.len())
}

/// Longest-common-subsequence F-measure between one prediction and one reference.
pub fn rouge_l(prediction: &str, reference: &str) -> f64 {
    let pred = rouge_tokens(prediction);
    let refs = rouge_tokens(reference);
    if pred.is_empty() || refs.is_empty() {
        return 0.0;
    }

    let mut prev = vec![0usize; refs.len() + 1];
    let mut curr = vec![0usize; refs.len() + 1];
    for p in &pred {
        for (j, r) in refs.iter().enumerate() {
            curr[j + 1] = if p == r {
                prev[j] + 1
            } else {
                curr[j].max(prev[j + 1])
            };
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    f_measure(prev[refs.len()], pred.len(), refs.len())
}

/// Fraction of predictions equal to their target after trimming.
pub fn accuracy(predictions: &[String], targets: &[String]) -> f64 {
    if targets.is_empty() {
        return 0.0;
    }
    let correct = predictions
        .iter()
        .zip(targets)
        .filter(|(p, t)| p.trim() == t.trim())
        .count();
    correct as f64 / targets.len() as f64
}

/// Macro-averaged F1 over a fixed label set.
///
/// Predictions outside the label set count as false negatives for the true
/// label only. Labels with no support and no predictions score 0.
pub fn macro_f1(predictions: &[String], targets: &[String], labels: &[&str]) -> f64 {
    if labels.is_empty() {
        return 0.0;
    }
    let mut total = 0.0;
    for label in labels {
        let (mut tp, mut fp, mut fn_) = (0usize, 0usize, 0usize);
        for (p, t) in predictions.iter().zip(targets) {
            let p_is = p.trim() == *label;
            let t_is = t.trim() == *label;
            match (p_is, t_is) {
                (true, true) => tp += 1,
                (true, false) => fp += 1,
                (false, true) => fn_ += 1,
                (false, false) => {}
            }
        }
        let denom = 2 * tp + fp + fn_;
        if denom > 0 {
            total += 2.0 * tp as f64 / denom as f64;
        }
    }
    total / labels.len() as f64
}

/// Mean absolute and root-mean-squared error of rating predictions.
///
/// Returns an error if a target is not a number.
pub fn mae_rmse(predictions: &[String], targets: &[String]) -> anyhow::Result<(f64, f64)> {
    if targets.is_empty() {
        return Ok((0.0, 0.0));
    }
    let mut abs_sum = 0.0;
    let mut sq_sum = 0.0;
    for (p, t) in predictions.iter().zip(targets) {
        let target: f64 = t
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("Rating target '{t}' is not a number: {e}"))?;
        let diff = rating_value(p, target) - target;
        abs_sum += diff.abs();
        sq_sum += diff * diff;
    }
    let n = targets.len() as f64;
    Ok((abs_sum / n, (sq_sum / n).sqrt()))
}

/// Named metric values of one evaluation, plus which one drives model selection.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskMetrics {
    pub values: BTreeMap<String, f64>,
    pub primary: &'static str,
    pub higher_is_better: bool,
}

impl TaskMetrics {
    pub fn primary_value(&self) -> f64 {
        self.values.get(self.primary).copied().unwrap_or(f64::NAN)
    }

    /// Whether `self` beats `other` on the primary metric.
    pub fn improves_on(&self, other: Option<&TaskMetrics>) -> bool {
        let Some(other) = other else {
            return true;
        };
        let (a, b) = (self.primary_value(), other.primary_value());
        if self.higher_is_better {
            a > b
        } else {
            a < b
        }
    }

    pub fn display(&self) -> String {
        self.values
            .iter()
            .map(|(k, v)| format!("{k}={v:.4}"))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Compute the benchmark metrics for a task.
pub fn evaluate_task(task: Task, predictions: &[String], targets: &[String]) -> anyhow::Result<TaskMetrics> {
    anyhow::ensure!(
        predictions.len() == targets.len(),
        "Got {} predictions for {} targets",
        predictions.len(),
        targets.len()
    );
    let mut values = BTreeMap::new();
    let metrics = match task.kind() {
        TaskKind::Classification => {
            values.insert("accuracy".to_string(), accuracy(predictions, targets));
            values.insert("f1".to_string(), macro_f1(predictions, targets, &task.labels()));
            TaskMetrics { values, primary: "accuracy", higher_is_better: true }
        }
        TaskKind::Regression => {
            let (mae, rmse) = mae_rmse(predictions, targets)?;
            values.insert("mae".to_string(), mae);
            values.insert("rmse".to_string(), rmse);
            TaskMetrics { values, primary: "mae", higher_is_better: false }
        }
        TaskKind::Generation => {
            let n = targets.len().max(1) as f64;
            let r1: f64 = predictions.iter().zip(targets).map(|(p, t)| rouge1(p, t)).sum();
            let rl: f64 = predictions.iter().zip(targets).map(|(p, t)| rouge_l(p, t)).sum();
            values.insert("rouge-1".to_string(), r1 / n);
            values.insert("rouge-L".to_string(), rl / n);
            TaskMetrics { values, primary: "rouge-1", higher_is_better: true }
        }
    };
    Ok(metrics)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(v: &[&str]) -> Vec<String> {
        v.iter().map(|x| x.to_string()).collect()
    }

    #[test]
    fn test_rating_value_fallback_is_farther_boundary() {
        assert_eq!(rating_value("abc", 4.0), 1.0);
        assert_eq!(rating_value("abc", 2.0), 5.0);
        // Equidistant target picks the upper boundary.
        assert_eq!(rating_value("", 3.0), 5.0);
        assert_eq!(rating_value(" 3 ", 4.0), 3.0);
    }

    #[test]
    fn test_rouge_tokens() {
        assert_eq!(rouge_tokens("Hello, World! 42x"), vec!["hello", "world", "42x"]);
        assert!(rouge_tokens("!!!").is_empty());
    }

    #[test]
    fn test_rouge1() {
        assert!((rouge1("the cat sat", "the cat sat") - 1.0).abs() < 1e-12);
        assert_eq!(rouge1("dog", "cat"), 0.0);
        assert_eq!(rouge1("", "cat"), 0.0);
        // P = 1/2, R = 1/1 → F = 2/3
        assert!((rouge1("cat dog", "cat") - 2.0 / 3.0).abs() < 1e-12);
        // Clipped counts: "the the" vs "the" → overlap 1.
        assert!((rouge1("the the", "the") - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_rouge_l() {
        assert!((rouge_l("a b c d", "a b c d") - 1.0).abs() < 1e-12);
        // LCS("a c b", "a b") = 2 → P = 2/3, R = 1
        assert!((rouge_l("a c b", "a b") - 0.8).abs() < 1e-12);
    }

    #[test]
    fn test_accuracy_and_f1() {
        let preds = s(&["[1]", "[2]", "[1]", "junk"]);
        let golds = s(&["[1]", "[1]", "[1]", "[2]"]);
        assert!((accuracy(&preds, &golds) - 0.5).abs() < 1e-12);
        // label [1]: tp=2 fp=0 fn=1 → 0.8 ; label [2]: tp=0 fp=1 fn=1 → 0
        assert!((macro_f1(&preds, &golds, &["[1]", "[2]"]) - 0.4).abs() < 1e-12);
    }

    #[test]
    fn test_mae_rmse() {
        let (mae, rmse) = mae_rmse(&s(&["3", "abc"]), &s(&["5", "4"])).unwrap();
        // errors: 2 and 3
        assert!((mae - 2.5).abs() < 1e-12);
        assert!((rmse - (6.5f64).sqrt()).abs() < 1e-12);
        assert!(mae_rmse(&s(&["3"]), &s(&["x"])).is_err());
    }

    #[test]
    fn test_evaluate_task_primary() {
        let m = evaluate_task(Task::LaMP3, &s(&["4"]), &s(&["4"])).unwrap();
        assert_eq!(m.primary, "mae");
        assert!(!m.higher_is_better);
        let worse = evaluate_task(Task::LaMP3, &s(&["1"]), &s(&["4"])).unwrap();
        assert!(m.improves_on(Some(&worse)));
        assert!(!worse.improves_on(Some(&m)));

        let g = evaluate_task(Task::LaMP4, &s(&["a b"]), &s(&["a b"])).unwrap();
        assert!((g.primary_value() - 1.0).abs() < 1e-12);
        assert!(evaluate_task(Task::LaMP4, &s(&["a"]), &s(&[])).is_err());
    }
}
