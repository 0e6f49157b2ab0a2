//! Genetic search over building-block combinations.
//!
//! A genome picks one value per gene column (for example topology, metal
//! node and organic linker). Fitness comes from an additive surrogate fitted
//! on the lookup table, so the search is cheap and fully deterministic for
//! a given seed.

use std::collections::{BTreeMap, HashSet};
use std::str::FromStr;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::table::MofTable;

#[derive(Debug, Clone, PartialEq)]
pub struct GaConfig {
    pub population: usize,
    pub generations: usize,
    pub mutation_rate: f64,
    /// Genomes copied unchanged into the next generation
    pub elite: usize,
    pub seed: u64,
    /// Candidates reported
    pub top_k: usize,
}

impl Default for GaConfig {
    fn default() -> Self {
        Self {
            population: 100,
            generations: 20,
            mutation_rate: 0.1,
            elite: 2,
            seed: 42,
            top_k: 5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Objective {
    Maximize,
    Minimize,
    Target(f64),
}

impl Objective {
    fn score(&self, predicted: f64) -> f64 {
        match self {
            Self::Maximize => predicted,
            Self::Minimize => -predicted,
            Self::Target(target) => -(predicted - target).abs(),
        }
    }
}

impl FromStr for Objective {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = s.trim().trim_matches('`').trim().to_lowercase();
        match value.as_str() {
            "maximize" | "max" | "highest" | "high" => Ok(Self::Maximize),
            "minimize" | "min" | "lowest" | "low" => Ok(Self::Minimize),
            other => other
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .map(Self::Target)
                .ok_or_else(|| {
                    format!(
                        "objective must be maximize, minimize or a number, got: {}",
                        s.trim()
                    )
                }),
        }
    }
}

/// Property ≈ mean + Σ effect(gene value).
#[derive(Debug, Clone)]
pub struct Surrogate {
    columns: Vec<String>,
    pools: Vec<Vec<String>>,
    effects: Vec<Vec<f64>>,
    mean: f64,
    known: HashSet<Vec<String>>,
}

impl Surrogate {
    /// Fit on every row with a numeric `property` and all gene values present.
    pub fn fit(table: &MofTable, columns: &[String], property: &str) -> Result<Self, String> {
        if columns.is_empty() {
            return Err("no building-block columns configured".into());
        }
        for column in columns {
            if table.column_index(column).is_none() {
                return Err(format!("the table has no '{}' column", column));
            }
        }
        if table.column_index(property).is_none() {
            return Err(format!("the table has no '{}' column", property));
        }

        let samples: Vec<(Vec<String>, f64)> = table
            .rows()
            .iter()
            .filter_map(|row| {
                let y = table.number(row, property).filter(|v| v.is_finite())?;
                let genes = columns
                    .iter()
                    .map(|c| table.value(row, c).map(str::to_string))
                    .collect::<Option<Vec<_>>>()?;
                Some((genes, y))
            })
            .collect();
        if samples.is_empty() {
            return Err(format!("no rows with a numeric value for '{}'", property));
        }

        let mean = samples.iter().map(|(_, y)| y).sum::<f64>() / samples.len() as f64;

        let mut pools = Vec::with_capacity(columns.len());
        let mut effects = Vec::with_capacity(columns.len());
        for gene in 0..columns.len() {
            let mut groups: BTreeMap<&str, (f64, usize)> = BTreeMap::new();
            for (genes, y) in &samples {
                let slot = groups.entry(genes[gene].as_str()).or_insert((0.0, 0));
                slot.0 += y;
                slot.1 += 1;
            }
            pools.push(groups.keys().map(|k| k.to_string()).collect());
            effects.push(
                groups
                    .values()
                    .map(|(sum, n)| sum / *n as f64 - mean)
                    .collect(),
            );
        }

        let known = samples.into_iter().map(|(genes, _)| genes).collect();

        Ok(Self {
            columns: columns.to_vec(),
            pools,
            effects,
            mean,
            known,
        })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    fn predict(&self, genome: &[usize]) -> f64 {
        self.mean
            + genome
                .iter()
                .enumerate()
                .map(|(gene, &allele)| self.effects[gene][allele])
                .sum::<f64>()
    }

    fn decode(&self, genome: &[usize]) -> Vec<String> {
        genome
            .iter()
            .enumerate()
            .map(|(gene, &allele)| self.pools[gene][allele].clone())
            .collect()
    }

    fn random_genome(&self, rng: &mut StdRng) -> Vec<usize> {
        self.pools.iter().map(|pool| rng.gen_range(0..pool.len())).collect()
    }
}

/// One proposed building-block combination.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub genes: Vec<String>,
    pub predicted: f64,
    /// Absent from the lookup table
    pub novel: bool,
}

/// Run the genetic algorithm and return the best distinct candidates.
pub fn evolve(surrogate: &Surrogate, objective: Objective, config: &GaConfig) -> Vec<Candidate> {
    let mut rng = StdRng::seed_from_u64(config.seed);
    let population_size = config.population.max(2);
    let fitness = |genome: &Vec<usize>| objective.score(surrogate.predict(genome));

    let mut population: Vec<Vec<usize>> = (0..population_size)
        .map(|_| surrogate.random_genome(&mut rng))
        .collect();
    let mut seen: HashSet<Vec<usize>> = population.iter().cloned().collect();

    for generation in 0..config.generations {
        population.sort_by(|a, b| fitness(b).total_cmp(&fitness(a)));

        let mut next: Vec<Vec<usize>> = population
            .iter()
            .take(config.elite.min(population_size))
            .cloned()
            .collect();

        while next.len() < population_size {
            let mother = tournament(&population, &fitness, &mut rng);
            let father = tournament(&population, &fitness, &mut rng);
            let mut child: Vec<usize> = mother
                .iter()
                .zip(father)
                .map(|(&m, &f)| if rng.gen_bool(0.5) { m } else { f })
                .collect();
            for (gene, allele) in child.iter_mut().enumerate() {
                if rng.gen::<f64>() < config.mutation_rate {
                    *allele = rng.gen_range(0..surrogate.pools[gene].len());
                }
            }
            seen.insert(child.clone());
            next.push(child);
        }

        population = next;
        tracing::trace!(
            generation,
            best = population.iter().map(&fitness).fold(f64::NEG_INFINITY, f64::max),
            "Generation complete"
        );
    }

    let mut ranked: Vec<Vec<usize>> = seen.into_iter().collect();
    ranked.sort_by(|a, b| fitness(b).total_cmp(&fitness(a)).then_with(|| a.cmp(b)));

    ranked
        .into_iter()
        .take(config.top_k)
        .map(|genome| {
            let genes = surrogate.decode(&genome);
            Candidate {
                novel: !surrogate.known.contains(&genes),
                predicted: surrogate.predict(&genome),
                genes,
            }
        })
        .collect()
}

fn tournament<'p, F>(population: &'p [Vec<usize>], fitness: &F, rng: &mut StdRng) -> &'p Vec<usize>
where
    F: Fn(&Vec<usize>) -> f64,
{
    const SIZE: usize = 3;
    let mut best = &population[rng.gen_range(0..population.len())];
    for _ in 1..SIZE {
        let challenger = &population[rng.gen_range(0..population.len())];
        if fitness(challenger) > fitness(best) {
            best = challenger;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mof::table::fixtures::SAMPLE_CSV;

    fn genes() -> Vec<String> {
        ["topology", "metal_node", "organic_linker"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    fn table() -> MofTable {
        MofTable::from_reader(SAMPLE_CSV.as_bytes(), "name").unwrap()
    }

    #[test]
    fn objective_parsing() {
        assert_eq!("Maximize".parse::<Objective>(), Ok(Objective::Maximize));
        assert_eq!(" lowest ".parse::<Objective>(), Ok(Objective::Minimize));
        assert_eq!("0.5".parse::<Objective>(), Ok(Objective::Target(0.5)));
        assert!("sideways".parse::<Objective>().is_err());
    }

    #[test]
    fn surrogate_reproduces_group_means() {
        let surrogate = Surrogate::fit(&table(), &genes(), "void_fraction").unwrap();
        assert_eq!(surrogate.pools[0], vec!["dia".to_string(), "pcu".to_string()]);
        let mean = (0.62 + 0.48 + 0.71 + 0.55) / 4.0;
        assert!((surrogate.mean - mean).abs() < 1e-12);
    }

    #[test]
    fn surrogate_rejects_unknown_columns() {
        assert!(Surrogate::fit(&table(), &genes(), "colour").is_err());
        assert!(Surrogate::fit(&table(), &["shape".to_string()], "density").is_err());
    }

    #[test]
    fn maximize_finds_best_combination() {
        let surrogate = Surrogate::fit(&table(), &genes(), "void_fraction").unwrap();
        let config = GaConfig {
            population: 20,
            generations: 10,
            ..GaConfig::default()
        };
        let best = &evolve(&surrogate, Objective::Maximize, &config)[0];
        // dia and Zn and BTC each carry the highest group mean.
        assert_eq!(best.genes, vec!["dia", "Zn", "BTC"]);
        assert!(!best.novel);
    }

    #[test]
    fn same_seed_same_candidates() {
        let surrogate = Surrogate::fit(&table(), &genes(), "density").unwrap();
        let config = GaConfig::default();
        let first = evolve(&surrogate, Objective::Target(1.0), &config);
        let second = evolve(&surrogate, Objective::Target(1.0), &config);
        assert_eq!(first, second);
        assert!(first.len() <= config.top_k);
    }

    #[test]
    fn novel_candidates_are_marked() {
        let surrogate = Surrogate::fit(&table(), &genes(), "density").unwrap();
        let candidates = evolve(&surrogate, Objective::Minimize, &GaConfig::default());
        assert!(candidates.iter().any(|c| c.novel));
    }
}
