//! Integration tests for cascades through the reference processors.
//!
//! Each test wires a [`PopulationStore`] and the default processor set to a
//! bare [`EventScheduler`] and drains by hand, so the outcome of a single
//! pass can be inspected without the engine loop.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime, TimeDelta};
use popsim_core::config::PopulationConfig;
use popsim_core::population::PopulationProvider;
use popsim_core::scheduler::EventScheduler;
use popsim_population::processors::default_processors;
use popsim_population::{Person, PopulationStore};
use popsim_types::{
    DeathCause, Event, EventKind, EventPayload, PersonId, Sex, TimeUnit,
};

fn t0() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(1900, 1, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
}

fn born(years_before_t0: i32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(1900 - years_before_t0, 6, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
}

struct World {
    store: Arc<PopulationStore>,
    scheduler: EventScheduler,
}

fn world(max_age_years: u32) -> World {
    let store = Arc::new(PopulationStore::new());
    let scheduler = EventScheduler::new();
    let config = PopulationConfig {
        max_age_years,
        ..PopulationConfig::default()
    };
    for processor in default_processors(&store, &config) {
        scheduler.register_processor(processor);
    }
    World { store, scheduler }
}

impl World {
    fn add(&self, name: &str, sex: Sex, age: i32) -> PersonId {
        self.store
            .add_inhabitant(Person::new(name, sex, born(age), "homeland"))
            .unwrap()
    }

    fn couple(&self) -> (PersonId, PersonId) {
        let x = self.add("Xavier", Sex::Male, 40);
        let y = self.add("Yvonne", Sex::Female, 38);
        self.store.form_partnership(x, y).unwrap();
        (x, y)
    }
}

#[test]
fn death_clears_partner_reference_in_the_same_pass() {
    let world = world(90);
    let (x, y) = world.couple();
    let when = t0() + TimeDelta::days(1);

    world
        .scheduler
        .schedule_event(
            Event::new(
                EventPayload::Death {
                    person: x,
                    cause: DeathCause::Accident,
                },
                when,
            )
            .with_priority(100),
        )
        .unwrap();

    let report = world.scheduler.process_events(when).unwrap();

    assert_eq!(report.dispatched, 2);
    assert_eq!(report.by_kind.get(&EventKind::Death), Some(&1));
    assert_eq!(report.by_kind.get(&EventKind::PartnershipDissolved), Some(&1));
    assert_eq!(report.processor_failures, 0);

    let deceased = world.store.get(x).unwrap();
    assert_eq!(deceased.deceased.unwrap().at, when);
    assert_eq!(deceased.deceased.unwrap().cause, DeathCause::Accident);
    assert!(world.store.get(y).unwrap().partner.is_none());
    assert_eq!(world.store.living(), vec![y]);
    assert_eq!(world.scheduler.event_count(), 0);
}

#[test]
fn fatal_health_change_cascades_to_death_and_dissolution() {
    let world = world(90);
    let (x, y) = world.couple();

    for delta in [-60, -60] {
        world
            .scheduler
            .schedule_event(Event::new(
                EventPayload::HealthChange { person: y, delta },
                t0(),
            ))
            .unwrap();
    }
    let report = world.scheduler.process_events(t0()).unwrap();

    // Two health changes, one death, one dissolution.
    assert_eq!(report.dispatched, 4);
    let record = world.store.get(y).unwrap();
    assert_eq!(record.health, 0);
    assert_eq!(record.deceased.unwrap().cause, DeathCause::Illness);
    assert!(world.store.get(x).unwrap().partner.is_none());
}

#[test]
fn repeated_fatal_health_changes_schedule_one_death() {
    let world = world(90);
    let loner = world.add("Lone", Sex::Female, 50);

    // Both changes outrank the death they trigger, so they land in the
    // same pass before it.
    for delta in [-100, -10] {
        world
            .scheduler
            .schedule_event(
                Event::new(EventPayload::HealthChange { person: loner, delta }, t0())
                    .with_priority(200),
            )
            .unwrap();
    }
    let report = world.scheduler.process_events(t0()).unwrap();

    assert_eq!(report.dispatched, 3);
    assert_eq!(report.by_kind.get(&EventKind::HealthChange), Some(&2));
    assert_eq!(report.by_kind.get(&EventKind::Death), Some(&1));
    assert_eq!(report.processor_failures, 0);
    let record = world.store.get(loner).unwrap();
    assert_eq!(record.health, 0);
    assert_eq!(record.deceased.unwrap().cause, DeathCause::Illness);
    assert_eq!(world.scheduler.event_count(), 0);
}

#[test]
fn aging_kills_elders_on_the_tick_they_cross_the_limit() {
    let world = world(80);
    let elder = world.add("Old", Sex::Male, 85);
    let young = world.add("Young", Sex::Female, 20);

    world
        .scheduler
        .schedule_event(
            Event::new(
                EventPayload::TimeChange {
                    previous: t0() - TimeDelta::days(1),
                    current: t0(),
                    unit: TimeUnit::Day,
                    population: world.store.living(),
                },
                t0(),
            )
            .with_priority(1000),
        )
        .unwrap();
    world.scheduler.process_events(t0()).unwrap();

    assert_eq!(
        world.store.get(elder).unwrap().deceased.unwrap().cause,
        DeathCause::OldAge
    );
    assert_eq!(world.store.living(), vec![young]);
}

#[test]
fn aging_reads_the_post_cascade_population() {
    let world = world(80);
    let elder = world.add("Old", Sex::Male, 85);

    // An accident ahead of the tick event kills the elder first.
    world
        .scheduler
        .schedule_event(
            Event::new(
                EventPayload::Death {
                    person: elder,
                    cause: DeathCause::Accident,
                },
                t0(),
            )
            .with_priority(2000),
        )
        .unwrap();
    world
        .scheduler
        .schedule_event(
            Event::new(
                EventPayload::TimeChange {
                    previous: t0() - TimeDelta::days(1),
                    current: t0(),
                    unit: TimeUnit::Day,
                    population: vec![elder],
                },
                t0(),
            )
            .with_priority(1000),
        )
        .unwrap();
    let report = world.scheduler.process_events(t0()).unwrap();

    assert_eq!(report.dispatched, 2);
    assert_eq!(report.processor_failures, 0);
    assert_eq!(
        world.store.get(elder).unwrap().deceased.unwrap().cause,
        DeathCause::Accident
    );
}

#[test]
fn birth_adds_child_in_mothers_region() {
    let world = world(90);
    let (x, y) = world.couple();
    world.store.relocate(y, "riverside").unwrap();
    let child = PersonId::new();

    world
        .scheduler
        .schedule_event(Event::new(
            EventPayload::Birth {
                child,
                name: "Zoe".to_owned(),
                sex: Sex::Female,
                mother: y,
                father: Some(x),
            },
            t0(),
        ))
        .unwrap();
    world.scheduler.process_events(t0()).unwrap();

    let record = world.store.get(child).unwrap();
    assert_eq!(record.region, "riverside");
    assert_eq!(record.mother, Some(y));
    assert_eq!(record.father, Some(x));
    assert_eq!(record.born_at, t0());
    assert_eq!(world.store.living_count(), 3);
}

#[test]
fn emigration_leaves_the_living_population_and_frees_the_partner() {
    let world = world(90);
    let (x, y) = world.couple();

    world
        .scheduler
        .schedule_event(Event::new(
            EventPayload::Migration {
                person: x,
                destination: None,
            },
            t0(),
        ))
        .unwrap();
    world.scheduler.process_events(t0()).unwrap();

    assert_eq!(world.store.living(), vec![y]);
    assert!(world.store.get(y).unwrap().partner.is_none());
    assert_eq!(world.store.census().emigrated, 1);
}

#[test]
fn invalid_events_are_isolated_failures() {
    let world = world(90);
    let (x, _) = world.couple();
    let stranger = PersonId::new();

    for payload in [
        EventPayload::Death {
            person: stranger,
            cause: DeathCause::Unspecified,
        },
        EventPayload::PartnershipFormed {
            first: x,
            second: x,
        },
        EventPayload::HealthChange { person: x, delta: -5 },
    ] {
        world
            .scheduler
            .schedule_event(Event::new(payload, t0()))
            .unwrap();
    }
    let report = world.scheduler.process_events(t0()).unwrap();

    assert_eq!(report.dispatched, 3);
    assert_eq!(report.processor_failures, 2);
    assert_eq!(world.store.get(x).unwrap().health, 95);
}
