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

use std::{fs, path::PathBuf, process};

use civet_err::Result;
use civet_sim::{parse_customers, Class, Scheduler};
use clap::Parser;

/// Run the airport check-in simulation over a customer file.
///
/// The file's first line holds the customer count N, followed by N lines of
/// ID:CLASS,ARRIVAL,SERVICE with CLASS 0 (economy) or 1 (business) and times
/// in tenths of a second.
#[derive(Parser)]
struct Args {
    /// Path to the customer file.
    customers_file: PathBuf,
    /// Number of clerk threads.
    #[arg(long, default_value_t = 5)]
    clerks: usize,
}

fn main() {
    env_logger::init();
    let args = Args::parse();
    if let Err(error) = run(&args) {
        eprintln!("{error}");
        process::exit(1);
    }
}

fn run(args: &Args) -> Result<()> {
    let customers = parse_customers(&fs::read_to_string(&args.customers_file)?)?;
    let report = Scheduler::new(customers, args.clerks)?.run();

    for record in &report.records {
        let class = match record.class {
            Class::Business => "business",
            Class::Economy => "economy",
        };
        println!(
            "Customer {:2} ({class}): arrived {:.2}s, service start {:.2}s (clerk {}), \
             service end {:.2}s, waited {:.2}s",
            record.id, record.arrived, record.service_started, record.clerk,
            record.service_ended, record.waited
        );
    }

    println!();
    println!(
        "We served a total of {} customers, of which {} were business-class \
         and {} were economy-class.",
        report.customer_count(),
        report.business_count,
        report.economy_count
    );
    println!(
        "The average waiting time for all customers in the system is: {:.2} seconds.",
        report.average_waiting()
    );
    println!(
        "The average waiting time for all business-class customers is: {:.2} seconds.",
        report.average_business_waiting()
    );
    println!(
        "The average waiting time for all economy-class customers is: {:.2} seconds.",
        report.average_economy_waiting()
    );

    Ok(())
}
