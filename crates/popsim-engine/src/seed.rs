//! Initial population and opening events for the demo run.
//!
//! At startup the demo creates `population.initial_inhabitants` people with
//! random sexes and ages, then schedules a handful of partnerships, births,
//! health shocks, and migrations spread over the first simulated year so
//! the reference processors have something to cascade on. All randomness
//! comes from one seeded RNG, so a given config always produces the same
//! run.

use chrono::{Days, NaiveDateTime};
use popsim_core::config::PopulationConfig;
use popsim_population::{Person, PopulationStore};
use popsim_types::{Event, EventPayload, PersonId, Sex};
use rand::Rng;
use rand::seq::{IndexedRandom, SliceRandom};
use serde::Deserialize;
use tracing::info;

use crate::error::DemoError;

// -----------------------------------------------------------------------
// Configuration
// -----------------------------------------------------------------------

/// Demo run settings, read from the `demo` section of `popsim-config.yaml`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DemoConfig {
    /// Real seconds to run before stopping (0 = until Ctrl-C or the engine
    /// stops on its own).
    #[serde(default = "default_run_seconds")]
    pub run_seconds: u64,

    /// Partnerships formed during the opening year.
    #[serde(default = "default_partnerships")]
    pub partnerships: u32,

    /// Births among the new couples.
    #[serde(default = "default_births")]
    pub births: u32,

    /// Negative health changes applied to random individuals.
    #[serde(default = "default_health_shocks")]
    pub health_shocks: u32,

    /// Individuals who leave the simulation.
    #[serde(default = "default_emigrants")]
    pub emigrants: u32,

    /// Simulated days over which opening events are spread.
    #[serde(default = "default_horizon_days")]
    pub horizon_days: u32,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            run_seconds: default_run_seconds(),
            partnerships: default_partnerships(),
            births: default_births(),
            health_shocks: default_health_shocks(),
            emigrants: default_emigrants(),
            horizon_days: default_horizon_days(),
        }
    }
}

const fn default_run_seconds() -> u64 {
    10
}

const fn default_partnerships() -> u32 {
    10
}

const fn default_births() -> u32 {
    5
}

const fn default_health_shocks() -> u32 {
    8
}

const fn default_emigrants() -> u32 {
    2
}

const fn default_horizon_days() -> u32 {
    365
}

// -----------------------------------------------------------------------
// Name pool
// -----------------------------------------------------------------------

const NAME_POOL: &[&str] = &[
    "Agnes", "Bertram", "Clara", "Dorothea", "Edwin", "Frieda", "Gustav",
    "Hilda", "Ida", "Jakob", "Katharina", "Ludwig", "Martha", "Niklas",
    "Otto", "Paula", "Quirin", "Rosa", "Simon", "Theresa", "Ulrich",
    "Viktoria", "Walter", "Xaver", "Yvonne", "Zenzi",
];

/// Age from which seeded individuals may form partnerships.
const ADULT_AGE_YEARS: u32 = 18;

/// Days from a partnership to the couple's first child.
const DAYS_TO_FIRST_CHILD: u64 = 300;

/// Unique display name for the `index`-th seeded person.
fn person_name(index: u32) -> String {
    let pool_len = u32::try_from(NAME_POOL.len()).unwrap_or(u32::MAX);
    let slot = index.checked_rem(pool_len).unwrap_or(0);
    let base = usize::try_from(slot)
        .ok()
        .and_then(|slot| NAME_POOL.get(slot))
        .copied()
        .unwrap_or("Person");
    match index.checked_div(pool_len).unwrap_or(0) {
        0 => base.to_owned(),
        round => format!("{base} {}", round.saturating_add(1)),
    }
}

// -----------------------------------------------------------------------
// Seeding
// -----------------------------------------------------------------------

/// Create the initial inhabitants. Ages are uniform below
/// `config.max_age_years`; sexes are even odds.
pub fn seed_population<R: Rng>(
    store: &PopulationStore,
    config: &PopulationConfig,
    start: NaiveDateTime,
    rng: &mut R,
) -> Result<Vec<PersonId>, DemoError> {
    let max_age_days = u64::from(config.max_age_years.saturating_sub(1)).saturating_mul(365);
    let mut people = Vec::new();

    for index in 0..config.initial_inhabitants {
        let sex = if rng.random_bool(0.5) {
            Sex::Female
        } else {
            Sex::Male
        };
        let age_days = if max_age_days == 0 {
            0
        } else {
            rng.random_range(0..max_age_days)
        };
        let born_at = start
            .checked_sub_days(Days::new(age_days))
            .ok_or_else(|| DemoError::Seeding {
                message: format!("birth date {age_days} days before {start} is out of range"),
            })?;
        let person = Person::new(person_name(index), sex, born_at, config.region.as_str());
        people.push(store.add_inhabitant(person)?);
    }

    info!(
        inhabitants = people.len(),
        region = config.region,
        seed = config.seed,
        "Initial population seeded"
    );
    Ok(people)
}

fn day_within(start: NaiveDateTime, horizon_days: u32, rng: &mut impl Rng) -> NaiveDateTime {
    let offset = rng.random_range(1..=u64::from(horizon_days.max(1)));
    start.checked_add_days(Days::new(offset)).unwrap_or(start)
}

/// Build the opening events for a freshly seeded store.
///
/// Partnerships pair adult women with adult men; births go to the first
/// couples; health shocks and emigrations hit random individuals.
pub fn opening_events<R: Rng>(
    store: &PopulationStore,
    people: &[PersonId],
    start: NaiveDateTime,
    demo: &DemoConfig,
    rng: &mut R,
) -> Vec<Event> {
    let adults: Vec<Person> = people
        .iter()
        .filter_map(|id| store.get(*id))
        .filter(|p| p.age_years(start) >= ADULT_AGE_YEARS)
        .collect();
    let mut women: Vec<PersonId> = adults
        .iter()
        .filter(|p| p.sex == Sex::Female)
        .map(|p| p.id)
        .collect();
    let mut men: Vec<PersonId> = adults
        .iter()
        .filter(|p| p.sex == Sex::Male)
        .map(|p| p.id)
        .collect();
    women.shuffle(rng);
    men.shuffle(rng);

    let mut events = Vec::new();
    let couples = usize::try_from(demo.partnerships).unwrap_or(usize::MAX);
    let births = usize::try_from(demo.births).unwrap_or(usize::MAX);

    for (index, (mother, father)) in women.into_iter().zip(men).take(couples).enumerate() {
        let formed_at = day_within(start, demo.horizon_days, rng);
        events.push(Event::new(
            EventPayload::PartnershipFormed {
                first: mother,
                second: father,
            },
            formed_at,
        ));
        if index < births {
            let born_at = formed_at
                .checked_add_days(Days::new(DAYS_TO_FIRST_CHILD))
                .unwrap_or(formed_at);
            let sex = if rng.random_bool(0.5) {
                Sex::Female
            } else {
                Sex::Male
            };
            events.push(Event::new(
                EventPayload::Birth {
                    child: PersonId::new(),
                    name: format!("Child {}", index.saturating_add(1)),
                    sex,
                    mother,
                    father: Some(father),
                },
                born_at,
            ));
        }
    }

    if !people.is_empty() {
        for _ in 0..demo.health_shocks {
            let Some(person) = people.choose(rng).copied() else {
                break;
            };
            let delta: i16 = rng.random_range(-60..=-10);
            events.push(Event::new(
                EventPayload::HealthChange { person, delta },
                day_within(start, demo.horizon_days, rng),
            ));
        }
        for _ in 0..demo.emigrants {
            let Some(person) = people.choose(rng).copied() else {
                break;
            };
            events.push(Event::new(
                EventPayload::Migration {
                    person,
                    destination: None,
                },
                day_within(start, demo.horizon_days, rng),
            ));
        }
    }

    info!(events = events.len(), "Opening events prepared");
    events
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::BTreeSet;

    use chrono::NaiveDate;
    use popsim_core::population::PopulationProvider;
    use popsim_types::EventKind;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;

    fn start() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(1900, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    fn seeded(seed: u64) -> (PopulationStore, Vec<PersonId>) {
        let store = PopulationStore::new();
        let config = PopulationConfig {
            initial_inhabitants: 60,
            seed,
            ..PopulationConfig::default()
        };
        let mut rng = StdRng::seed_from_u64(seed);
        let people = seed_population(&store, &config, start(), &mut rng).unwrap();
        (store, people)
    }

    #[test]
    fn seeds_the_configured_number_of_people() {
        let (store, people) = seeded(42);
        assert_eq!(people.len(), 60);
        assert_eq!(store.living_count(), 60);
        let max_age = PopulationConfig::default().max_age_years;
        assert!(store.living_aged_at_least(max_age, start()).is_empty());
    }

    #[test]
    fn names_are_unique_past_the_pool() {
        let names: BTreeSet<String> = (0..100).map(person_name).collect();
        assert_eq!(names.len(), 100);
        assert_eq!(person_name(0), "Agnes");
        assert_eq!(person_name(26), "Agnes 2");
    }

    #[test]
    fn same_seed_same_ages() {
        let (first, a) = seeded(7);
        let (second, b) = seeded(7);
        let ages = |store: &PopulationStore, ids: &[PersonId]| -> Vec<NaiveDateTime> {
            ids.iter().map(|id| store.get(*id).unwrap().born_at).collect()
        };
        assert_eq!(ages(&first, &a), ages(&second, &b));
    }

    #[test]
    fn opening_events_respect_the_demo_config() {
        let (store, people) = seeded(42);
        let demo = DemoConfig::default();
        let mut rng = StdRng::seed_from_u64(1);
        let events = opening_events(&store, &people, start(), &demo, &mut rng);

        let count = |kind| events.iter().filter(|e| e.kind() == kind).count();
        let partnerships = count(EventKind::PartnershipFormed);
        assert!(partnerships <= 10);
        assert_eq!(count(EventKind::Birth), partnerships.min(5));
        assert_eq!(count(EventKind::HealthChange), 8);
        assert_eq!(count(EventKind::Migration), 2);
        assert!(events.iter().all(|e| e.scheduled_time() > start()));

        // No one is paired twice.
        let mut partnered = BTreeSet::new();
        for event in &events {
            if let EventPayload::PartnershipFormed { first, second } = *event.payload() {
                assert!(partnered.insert(first));
                assert!(partnered.insert(second));
            }
        }
    }

    #[test]
    fn empty_population_gets_no_events() {
        let store = PopulationStore::new();
        let mut rng = StdRng::seed_from_u64(1);
        let events = opening_events(&store, &[], start(), &DemoConfig::default(), &mut rng);
        assert!(events.is_empty());
    }
}
