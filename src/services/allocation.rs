use std::collections::HashMap;

use rand::seq::SliceRandom;
use rand::Rng;

use crate::db::types::GradingLanguage;

/// One feedback record as seen by the balancer. Records that already carry a
/// grader only contribute to that grader's load.
#[derive(Debug, Clone)]
pub(crate) struct WorkItem {
    pub(crate) feedback_id: String,
    pub(crate) language: GradingLanguage,
    pub(crate) grader_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Assignment {
    pub(crate) feedback_id: String,
    pub(crate) grader_id: String,
}

#[derive(Debug)]
pub(crate) struct AllocationInput {
    pub(crate) num_of_graders: i32,
    /// Grader ids eligible for primary-language records, in roster order.
    pub(crate) general_pool: Vec<String>,
    /// Grader ids restricted to secondary-language records.
    pub(crate) secondary_pool: Vec<String>,
    pub(crate) items: Vec<WorkItem>,
}

/// Least-loaded grader of the pool; roster order breaks ties.
fn choose_grader<'a>(pool: &'a [String], counts: &HashMap<String, usize>) -> Option<&'a String> {
    pool.iter().min_by_key(|id| counts.get(id.as_str()).copied().unwrap_or(0))
}

fn take_if_under_cap<'a>(
    pool: &'a [String],
    counts: &HashMap<String, usize>,
    cap: Option<usize>,
) -> Option<&'a String> {
    let candidate = choose_grader(pool, counts)?;
    match cap {
        Some(cap) if counts.get(candidate.as_str()).copied().unwrap_or(0) >= cap => None,
        _ => Some(candidate),
    }
}

/// Distributes unassigned feedback records over the grader pools.
///
/// The first pass respects a soft per-grader cap derived from the configured
/// grader count, trying the record's language pool before falling back to the
/// general pool. When the cap blocks every grader the record waits for the
/// second pass, unless fewer graders are registered than configured, in which
/// case the rest of the batch stays unassigned until the roster is filled.
/// The second pass runs uncapped so nothing stays ungraded due to rounding.
pub(crate) fn divide_submissions<R: Rng>(input: &AllocationInput, rng: &mut R) -> Vec<Assignment> {
    if input.num_of_graders <= 0 {
        return Vec::new();
    }

    let mut general = input.general_pool.clone();
    general.shuffle(rng);
    let mut secondary = input.secondary_pool.clone();
    secondary.shuffle(rng);
    let grader_count = general.len() + secondary.len();

    let mut counts: HashMap<String, usize> = HashMap::new();
    for id in general.iter().chain(&secondary) {
        counts.entry(id.clone()).or_insert(0);
    }
    for item in &input.items {
        if let Some(grader_id) = &item.grader_id {
            *counts.entry(grader_id.clone()).or_insert(0) += 1;
        }
    }

    let cap = match input.items.len() / input.num_of_graders as usize {
        0 => None,
        cap => Some(cap),
    };

    let mut assignments = Vec::new();
    let mut leftovers: Vec<&WorkItem> = Vec::new();

    for item in &input.items {
        if item.grader_id.is_some() {
            continue;
        }

        let pick = match item.language {
            GradingLanguage::Secondary => take_if_under_cap(&secondary, &counts, cap)
                .or_else(|| take_if_under_cap(&general, &counts, cap)),
            GradingLanguage::Primary => take_if_under_cap(&general, &counts, cap),
        };

        match pick {
            Some(grader_id) => {
                let grader_id = grader_id.clone();
                *counts.entry(grader_id.clone()).or_insert(0) += 1;
                assignments
                    .push(Assignment { feedback_id: item.feedback_id.clone(), grader_id });
            }
            None if grader_count == input.num_of_graders as usize => leftovers.push(item),
            // Understaffed roster: the rest waits for more graders.
            None => break,
        }
    }

    if leftovers.is_empty() {
        return assignments;
    }

    let mut combined: Vec<String> = general.clone();
    for id in &secondary {
        if !combined.contains(id) {
            combined.push(id.clone());
        }
    }
    combined.shuffle(rng);

    for item in leftovers {
        // Restricted-pool graders only ever take secondary-language work.
        let pool: &[String] = match item.language {
            GradingLanguage::Secondary => &combined,
            GradingLanguage::Primary => &general,
        };

        if let Some(grader_id) = choose_grader(pool, &counts) {
            let grader_id = grader_id.clone();
            *counts.entry(grader_id.clone()).or_insert(0) += 1;
            assignments.push(Assignment { feedback_id: item.feedback_id.clone(), grader_id });
        }
    }

    assignments
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn item(id: &str, language: GradingLanguage) -> WorkItem {
        WorkItem { feedback_id: id.to_string(), language, grader_id: None }
    }

    fn assigned(id: &str, language: GradingLanguage, grader: &str) -> WorkItem {
        WorkItem {
            feedback_id: id.to_string(),
            language,
            grader_id: Some(grader.to_string()),
        }
    }

    fn pool(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    fn rng() -> StdRng {
        StdRng::seed_from_u64(7)
    }

    fn loads(assignments: &[Assignment]) -> HashMap<&str, usize> {
        let mut loads = HashMap::new();
        for a in assignments {
            *loads.entry(a.grader_id.as_str()).or_insert(0) += 1;
        }
        loads
    }

    #[test]
    fn spreads_evenly_over_the_pool() {
        let input = AllocationInput {
            num_of_graders: 3,
            general_pool: pool(&["a", "b", "c"]),
            secondary_pool: Vec::new(),
            items: (0..9).map(|i| item(&format!("f{i}"), GradingLanguage::Primary)).collect(),
        };

        let assignments = divide_submissions(&input, &mut rng());

        assert_eq!(assignments.len(), 9);
        let loads = loads(&assignments);
        assert_eq!(loads["a"], 3);
        assert_eq!(loads["b"], 3);
        assert_eq!(loads["c"], 3);
    }

    #[test]
    fn zero_configured_graders_assigns_nothing() {
        let input = AllocationInput {
            num_of_graders: 0,
            general_pool: pool(&["a"]),
            secondary_pool: Vec::new(),
            items: vec![item("f1", GradingLanguage::Primary)],
        };

        assert!(divide_submissions(&input, &mut rng()).is_empty());
    }

    #[test]
    fn secondary_records_go_to_secondary_pool_first() {
        let input = AllocationInput {
            num_of_graders: 2,
            general_pool: pool(&["a"]),
            secondary_pool: pool(&["en1"]),
            items: vec![
                item("f1", GradingLanguage::Secondary),
                item("f2", GradingLanguage::Primary),
            ],
        };

        let assignments = divide_submissions(&input, &mut rng());

        let by_id: HashMap<_, _> =
            assignments.iter().map(|a| (a.feedback_id.as_str(), a.grader_id.as_str())).collect();
        assert_eq!(by_id["f1"], "en1");
        assert_eq!(by_id["f2"], "a");
    }

    #[test]
    fn secondary_overflow_spills_into_combined_pool() {
        // One secondary grader, three secondary records, cap of one each.
        let input = AllocationInput {
            num_of_graders: 3,
            general_pool: pool(&["a", "b"]),
            secondary_pool: pool(&["en1"]),
            items: vec![
                item("f1", GradingLanguage::Secondary),
                item("f2", GradingLanguage::Secondary),
                item("f3", GradingLanguage::Secondary),
            ],
        };

        let assignments = divide_submissions(&input, &mut rng());

        assert_eq!(assignments.len(), 3, "every record gets a grader");
        let loads = loads(&assignments);
        assert!(loads.values().all(|count| *count <= 2), "overflow still balances: {loads:?}");
    }

    #[test]
    fn primary_records_never_use_secondary_only_graders() {
        let input = AllocationInput {
            num_of_graders: 2,
            general_pool: pool(&["a"]),
            secondary_pool: pool(&["en1"]),
            items: (0..4).map(|i| item(&format!("f{i}"), GradingLanguage::Primary)).collect(),
        };

        let assignments = divide_submissions(&input, &mut rng());

        assert_eq!(assignments.len(), 4);
        assert!(assignments.iter().all(|a| a.grader_id == "a"));
    }

    #[test]
    fn existing_assignments_count_toward_load() {
        let mut items = vec![
            assigned("f1", GradingLanguage::Primary, "a"),
            assigned("f2", GradingLanguage::Primary, "a"),
        ];
        items.extend((0..2).map(|i| item(&format!("n{i}"), GradingLanguage::Primary)));

        let input = AllocationInput {
            num_of_graders: 2,
            general_pool: pool(&["a", "b"]),
            secondary_pool: Vec::new(),
            items,
        };

        let assignments = divide_submissions(&input, &mut rng());

        assert_eq!(assignments.len(), 2, "pre-assigned records are not touched");
        assert!(assignments.iter().all(|a| a.grader_id == "b"), "new work flows to the idle grader");
    }

    #[test]
    fn fewer_items_than_graders_means_no_cap() {
        let input = AllocationInput {
            num_of_graders: 5,
            general_pool: pool(&["a", "b", "c", "d", "e"]),
            secondary_pool: Vec::new(),
            items: vec![item("f1", GradingLanguage::Primary), item("f2", GradingLanguage::Primary)],
        };

        let assignments = divide_submissions(&input, &mut rng());
        assert_eq!(assignments.len(), 2);
        let loads = loads(&assignments);
        assert!(loads.values().all(|count| *count == 1));
    }

    #[test]
    fn understaffed_roster_leaves_overflow_unassigned() {
        // One registered grader against a target of three.
        let input = AllocationInput {
            num_of_graders: 3,
            general_pool: pool(&["a"]),
            secondary_pool: Vec::new(),
            items: (0..6).map(|i| item(&format!("f{i}"), GradingLanguage::Primary)).collect(),
        };

        let assignments = divide_submissions(&input, &mut rng());

        // Cap of two is honored and the rest waits for more graders.
        assert_eq!(assignments.len(), 2);
        assert!(assignments.iter().all(|a| a.grader_id == "a"));
    }

    #[test]
    fn empty_general_pool_leaves_primary_unassigned() {
        let input = AllocationInput {
            num_of_graders: 1,
            general_pool: Vec::new(),
            secondary_pool: pool(&["en1"]),
            items: vec![item("f1", GradingLanguage::Primary)],
        };

        assert!(divide_submissions(&input, &mut rng()).is_empty());
    }
}
