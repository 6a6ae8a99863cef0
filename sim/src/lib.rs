// Copyright 2024 Kevin Ludwig
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

pub mod queue;

use std::{
    sync::{Arc, Condvar, Mutex},
    thread,
    time::{Duration, Instant},
};

pub use civet_err::{Error, Result};
use log::debug;

use crate::queue::Ring;

/// Index of the economy-class queue.
const ECONOMY: usize = 0;
/// Index of the business-class queue; always polled first.
const BUSINESS: usize = 1;
const QUEUE_COUNT: usize = 2;

/// How long an idle clerk backs off before polling the queues again.
const IDLE_RETRY: Duration = Duration::from_millis(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Class {
    Economy,
    Business,
}

impl Class {
    fn queue(self) -> usize {
        match self {
            Self::Economy => ECONOMY,
            Self::Business => BUSINESS,
        }
    }
}

/// One customer of the simulation. Times are in tenths of a second.
#[derive(Debug, Clone, Copy)]
pub struct Customer {
    pub id: u32,
    pub class: Class,
    pub arrival_tenths: u32,
    pub service_tenths: u32,
}

/// Parses a customer file: the first line holds the customer count, every
/// following line one `ID:CLASS,ARRIVAL,SERVICE` record with CLASS 0
/// (economy) or 1 (business) and strictly positive times.
pub fn parse_customers(input: &str) -> Result<Vec<Customer>> {
    let mut lines = input.lines();
    let count: usize = lines
        .next()
        .ok_or_else(|| Error::InvalidInput("empty customer file".to_string()))?
        .trim()
        .parse()
        .map_err(|_| Error::InvalidInput("invalid customer count".to_string()))?;
    if count == 0 {
        return Err(Error::InvalidInput(
            "customer count must be positive".to_string(),
        ));
    }

    let mut customers = Vec::with_capacity(count);
    for (number, line) in lines.filter(|line| !line.trim().is_empty()).enumerate() {
        if customers.len() == count {
            break;
        }
        customers.push(parse_customer(line.trim()).map_err(|error| {
            Error::InvalidInput(format!("customer record {}: {error}", number + 1))
        })?);
    }
    if customers.len() < count {
        return Err(Error::InvalidInput(format!(
            "expected {count} customer records, found {}",
            customers.len()
        )));
    }

    Ok(customers)
}

fn parse_customer(line: &str) -> core::result::Result<Customer, String> {
    let (id, rest) = line
        .split_once(':')
        .ok_or_else(|| format!("missing ':' in {line:?}"))?;
    let mut fields = rest.split(',');
    let (class, arrival, service) = match (fields.next(), fields.next(), fields.next(), fields.next()) {
        (Some(class), Some(arrival), Some(service), None) => (class, arrival, service),
        _ => return Err(format!("expected CLASS,ARRIVAL,SERVICE in {line:?}")),
    };

    let id = id
        .trim()
        .parse()
        .map_err(|_| format!("invalid customer id {id:?}"))?;
    let class = match class.trim() {
        "0" => Class::Economy,
        "1" => Class::Business,
        other => return Err(format!("invalid class {other:?}")),
    };
    let arrival_tenths = parse_positive(arrival, "arrival time")?;
    let service_tenths = parse_positive(service, "service time")?;

    Ok(Customer {
        id,
        class,
        arrival_tenths,
        service_tenths,
    })
}

fn parse_positive(field: &str, what: &str) -> core::result::Result<u32, String> {
    match field.trim().parse() {
        Ok(value) if value > 0 => Ok(value),
        _ => Err(format!("{what} must be a positive integer, got {field:?}")),
    }
}

/// Timeline of one served customer, in seconds since the simulation start.
#[derive(Debug, Clone, Copy)]
pub struct ServiceRecord {
    pub id: u32,
    pub class: Class,
    pub arrived: f64,
    pub service_started: f64,
    pub service_ended: f64,
    pub waited: f64,
    pub clerk: usize,
}

/// Outcome of a completed run.
#[derive(Debug, Clone)]
pub struct RunReport {
    /// One record per customer, ordered by customer id.
    pub records: Vec<ServiceRecord>,
    pub business_count: usize,
    pub economy_count: usize,
    pub total_waiting: f64,
    pub business_waiting: f64,
    pub economy_waiting: f64,
}

impl RunReport {
    pub fn customer_count(&self) -> usize {
        self.records.len()
    }

    pub fn average_waiting(&self) -> f64 {
        average(self.total_waiting, self.records.len())
    }

    pub fn average_business_waiting(&self) -> f64 {
        average(self.business_waiting, self.business_count)
    }

    pub fn average_economy_waiting(&self) -> f64 {
        average(self.economy_waiting, self.economy_count)
    }
}

fn average(sum: f64, count: usize) -> f64 {
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

/// Per-queue coordination state, guarded by the queue mutex.
struct QueueState {
    line: Ring,
    /// Which clerk currently owns the hand-off slot; `None` is FREE.
    status: Option<usize>,
    /// One-shot flag: only the head of the line may leave per hand-off.
    winner_selected: bool,
}

struct ClassQueue {
    state: Mutex<QueueState>,
    /// Broadcast by a claiming clerk to wake every waiter in this line.
    cond: Condvar,
}

impl ClassQueue {
    fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(QueueState {
                line: Ring::new(capacity),
                status: None,
                winner_selected: false,
            }),
            cond: Condvar::new(),
        }
    }
}

/// A clerk's completion rendezvous: its customer flips the flag and signals
/// once service is over.
struct ClerkSlot {
    done: Mutex<bool>,
    cond: Condvar,
}

struct Stats {
    total_waiting: f64,
    business_waiting: f64,
    economy_waiting: f64,
    remaining: usize,
}

struct Shared {
    customers: Vec<Customer>,
    queues: [ClassQueue; QUEUE_COUNT],
    clerks: Vec<ClerkSlot>,
    stats: Mutex<Stats>,
    records: Mutex<Vec<ServiceRecord>>,
    epoch: Instant,
}

impl Shared {
    fn elapsed(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64()
    }
}

/// The whole simulation as one owned value: construct, run to completion,
/// collect the report.
pub struct Scheduler {
    customers: Vec<Customer>,
    clerk_count: usize,
}

impl Scheduler {
    pub fn new(customers: Vec<Customer>, clerk_count: usize) -> Result<Self> {
        if customers.is_empty() {
            return Err(Error::InvalidInput("no customers to serve".to_string()));
        }
        if clerk_count == 0 {
            return Err(Error::InvalidInput("at least one clerk".to_string()));
        }

        Ok(Self {
            customers,
            clerk_count,
        })
    }

    pub fn run(self) -> RunReport {
        let business_count = self
            .customers
            .iter()
            .filter(|customer| customer.class == Class::Business)
            .count();
        let economy_count = self.customers.len() - business_count;

        let shared = Arc::new(Shared {
            queues: [
                ClassQueue::new(economy_count),
                ClassQueue::new(business_count),
            ],
            clerks: (0..self.clerk_count)
                .map(|_| ClerkSlot {
                    done: Mutex::new(false),
                    cond: Condvar::new(),
                })
                .collect(),
            stats: Mutex::new(Stats {
                total_waiting: 0.0,
                business_waiting: 0.0,
                economy_waiting: 0.0,
                remaining: self.customers.len(),
            }),
            records: Mutex::new(Vec::with_capacity(self.customers.len())),
            epoch: Instant::now(),
            customers: self.customers,
        });

        let clerks: Vec<_> = (0..self.clerk_count)
            .map(|clerk| {
                let shared = shared.clone();
                thread::spawn(move || clerk_main(&shared, clerk))
            })
            .collect();
        let customers: Vec<_> = (0..shared.customers.len())
            .map(|index| {
                let shared = shared.clone();
                thread::spawn(move || customer_main(&shared, index))
            })
            .collect();

        for handle in customers {
            handle.join().expect("customer thread panicked");
        }
        for handle in clerks {
            handle.join().expect("clerk thread panicked");
        }

        let stats = shared.stats.lock().unwrap();
        let mut records = shared.records.lock().unwrap().clone();
        records.sort_by_key(|record| record.id);

        RunReport {
            records,
            business_count,
            economy_count,
            total_waiting: stats.total_waiting,
            business_waiting: stats.business_waiting,
            economy_waiting: stats.economy_waiting,
        }
    }
}

fn tenths(value: u32) -> Duration {
    Duration::from_millis(value as u64 * 100)
}

fn customer_main(shared: &Shared, index: usize) {
    let customer = shared.customers[index];
    thread::sleep(tenths(customer.arrival_tenths));
    let arrived = shared.elapsed();
    debug!("customer {} arrives", customer.id);

    let queue = &shared.queues[customer.class.queue()];
    let mut state = queue.state.lock().unwrap();
    state
        .line
        .push(index)
        .expect("line is sized for every customer of its class");
    let entered_at = shared.elapsed();
    debug!(
        "customer {} enters queue {} (length {})",
        customer.id,
        customer.class.queue(),
        state.line.len()
    );

    // Hand-off: wait until a clerk has opened selection on this queue and
    // this customer is at the head of the line.
    loop {
        if state.line.front() == Some(index) && state.status.is_some() && !state.winner_selected {
            break;
        }
        state = queue.cond.wait(state).unwrap();
    }
    let popped = state.line.pop();
    debug_assert_eq!(popped, Some(index));
    state.winner_selected = true;
    // The claiming clerk stored its id before broadcasting; read it before
    // freeing the slot so another clerk may claim this queue.
    let clerk = state
        .status
        .take()
        .expect("open selection implies an owning clerk");
    drop(state);

    let service_started = shared.elapsed();
    let waited = service_started - entered_at;
    {
        let mut stats = shared.stats.lock().unwrap();
        stats.total_waiting += waited;
        match customer.class {
            Class::Business => stats.business_waiting += waited,
            Class::Economy => stats.economy_waiting += waited,
        }
    }

    debug!(
        "clerk {clerk} starts serving customer {} at {service_started:.2}",
        customer.id
    );
    thread::sleep(tenths(customer.service_tenths));
    let service_ended = shared.elapsed();
    debug!(
        "clerk {clerk} finishes serving customer {} at {service_ended:.2}",
        customer.id
    );

    shared.records.lock().unwrap().push(ServiceRecord {
        id: customer.id,
        class: customer.class,
        arrived,
        service_started,
        service_ended,
        waited,
        clerk,
    });

    let slot = &shared.clerks[clerk];
    *slot.done.lock().unwrap() = true;
    slot.cond.notify_one();

    shared.stats.lock().unwrap().remaining -= 1;
}

fn clerk_main(shared: &Shared, clerk: usize) {
    loop {
        if shared.stats.lock().unwrap().remaining == 0 {
            break;
        }

        // Strict priority: the business queue is always examined first.
        let mut selected = None;
        for queue_id in [BUSINESS, ECONOMY] {
            let queue = &shared.queues[queue_id];
            let mut state = queue.state.lock().unwrap();
            if !state.line.is_empty() && state.status.is_none() {
                state.status = Some(clerk);
                state.winner_selected = false;
                // Wake the whole line; only the head takes the slot.
                queue.cond.notify_all();
                selected = Some(queue_id);
                break;
            }
        }

        match selected {
            Some(queue_id) => {
                debug!("clerk {clerk} claims queue {queue_id}");
                let slot = &shared.clerks[clerk];
                let mut done = slot.done.lock().unwrap();
                while !*done {
                    done = slot.cond.wait(done).unwrap();
                }
                *done = false;
            }
            None => thread::sleep(IDLE_RETRY),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn customer(id: u32, class: Class, arrival_tenths: u32, service_tenths: u32) -> Customer {
        Customer {
            id,
            class,
            arrival_tenths,
            service_tenths,
        }
    }

    #[test]
    fn parses_well_formed_files() {
        let customers = parse_customers("3\n1:0,2,10\n2:1,3,5\n3:0,4,5\n").unwrap();
        assert_eq!(customers.len(), 3);
        assert_eq!(customers[0].id, 1);
        assert_eq!(customers[0].class, Class::Economy);
        assert_eq!(customers[1].class, Class::Business);
        assert_eq!(customers[2].arrival_tenths, 4);
        assert_eq!(customers[2].service_tenths, 5);
    }

    #[test]
    fn rejects_malformed_files() {
        assert!(parse_customers("").is_err());
        assert!(parse_customers("x\n").is_err());
        assert!(parse_customers("0\n").is_err());
        // Missing records.
        assert!(parse_customers("2\n1:0,2,10\n").is_err());
        // Class out of range.
        assert!(parse_customers("1\n1:2,2,10\n").is_err());
        // Times must be strictly positive.
        assert!(parse_customers("1\n1:0,0,10\n").is_err());
        assert!(parse_customers("1\n1:0,2,-4\n").is_err());
        // Not a record at all.
        assert!(parse_customers("1\nhello\n").is_err());
    }

    #[test]
    fn scheduler_requires_customers_and_clerks() {
        assert!(Scheduler::new(Vec::new(), 2).is_err());
        assert!(Scheduler::new(vec![customer(1, Class::Economy, 1, 1)], 0).is_err());
    }

    #[test]
    fn two_clerks_serve_business_without_waiting() {
        let report = Scheduler::new(
            vec![
                customer(1, Class::Economy, 2, 10),
                customer(2, Class::Business, 3, 5),
                customer(3, Class::Economy, 4, 5),
            ],
            2,
        )
        .unwrap()
        .run();

        assert_eq!(report.customer_count(), 3);
        assert_eq!(report.business_count, 1);
        assert_eq!(report.economy_count, 2);

        // Customers 1 and 2 find idle clerks; customer 3 waits for one.
        assert!(report.average_business_waiting() < 0.15);
        assert!(report.average_waiting() > 0.0);
        assert!(
            (report.total_waiting - report.business_waiting - report.economy_waiting).abs()
                < 1e-9
        );

        // Every record is accounted for, in id order.
        let ids: Vec<_> = report.records.iter().map(|record| record.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn single_clerk_prefers_business_at_every_hand_off() {
        let report = Scheduler::new(
            vec![
                customer(1, Class::Economy, 1, 10),
                customer(2, Class::Business, 2, 2),
                customer(3, Class::Economy, 3, 5),
                customer(4, Class::Economy, 4, 5),
            ],
            1,
        )
        .unwrap()
        .run();

        let start = |id: u32| {
            report
                .records
                .iter()
                .find(|record| record.id == id)
                .unwrap()
                .service_started
        };

        // Customer 1 is served immediately; the business customer is chosen
        // at the next hand-off, ahead of economy customers queued earlier.
        assert!(start(1) < start(2));
        assert!(start(2) < start(3));
        // FIFO within the economy class.
        assert!(start(3) < start(4));
    }
}
