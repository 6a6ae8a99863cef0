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

use std::io::{self, BufRead, Write};

use civet_proc::{
    stat::{parse_pid, ProcessStat, ProcessStatus},
    Error, JobList,
};

fn main() {
    env_logger::init();
    let mut jobs = JobList::new();
    let stdin = io::stdin();

    loop {
        // Jobs may have been killed or finished outside the manager; sweep
        // before every prompt.
        report_reaped(&mut jobs);

        print!("Pman: > ");
        let _ = io::stdout().flush();
        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }

        let mut fields = line.split_whitespace();
        let Some(command) = fields.next() else {
            continue;
        };
        let args: Vec<String> = fields.map(str::to_string).collect();

        match command {
            "bg" => bg(&mut jobs, &args),
            "bglist" => bglist(&mut jobs, &args),
            "bgkill" => with_pid(&args, |pid| bgkill(&mut jobs, pid)),
            "bgstop" => with_pid(&args, |pid| bgstop(&jobs, pid)),
            "bgstart" => with_pid(&args, |pid| bgstart(&jobs, pid)),
            "pstat" => with_pid(&args, |pid| pstat(&jobs, pid)),
            "q" => {
                println!("Bye Bye");
                return;
            }
            _ => println!("{}: command not found", line.trim_end()),
        }
    }
}

fn report_reaped(jobs: &mut JobList) {
    for outcome in jobs.reap() {
        if outcome.signaled {
            println!("Process {} was killed", outcome.pid);
        } else {
            println!("Process {} exits", outcome.pid);
        }
    }
}

fn with_pid(args: &[String], action: impl FnOnce(i32)) {
    let Some(text) = args.first() else {
        println!("Missing PID argument");
        return;
    };
    match parse_pid(text) {
        Ok(pid) => action(pid),
        Err(_) => println!("PID {text} is not valid"),
    }
}

fn bg(jobs: &mut JobList, args: &[String]) {
    let Some(command) = args.first() else {
        println!("Missing executable argument");
        return;
    };
    match jobs.spawn(command, &args[1..]) {
        Ok(pid) => println!("Process with PID {pid} started in background"),
        Err(Error::NotFound) => println!("Executable file {command} not found"),
        Err(error) => println!("{error}"),
    }
}

fn bglist(jobs: &mut JobList, args: &[String]) {
    if !args.is_empty() {
        println!("bglist takes no arguments");
        return;
    }
    if jobs.is_empty() {
        println!("No background jobs");
        return;
    }

    for (pid, path) in jobs.jobs() {
        println!("{pid}: {}", path.display());
    }
    println!("Total background jobs: {}", jobs.len());
}

fn bgkill(jobs: &mut JobList, pid: i32) {
    match jobs.kill(pid) {
        Ok(()) => println!("Process with PID {pid} has been killed"),
        Err(Error::NotFound) => println!("Process is not in the list"),
        Err(error) => println!("{error}"),
    }
}

fn bgstop(jobs: &JobList, pid: i32) {
    match jobs.stop(pid) {
        Ok(()) => println!("PID {pid} has been stopped"),
        Err(Error::NotFound) => println!("Process is not in the list"),
        Err(error) => println!("{error}"),
    }
}

fn bgstart(jobs: &JobList, pid: i32) {
    match jobs.resume(pid) {
        Ok(()) => println!("PID {pid} has been started from stopped state"),
        Err(Error::NotFound) => println!("Process is not in the list"),
        Err(error) => println!("{error}"),
    }
}

fn pstat(jobs: &JobList, pid: i32) {
    if !jobs.contains(pid) {
        println!("Process is not in the list");
        return;
    }

    let (stat, status) = match (ProcessStat::read(pid), ProcessStatus::read(pid)) {
        (Ok(stat), Ok(status)) => (stat, status),
        (Err(error), _) | (_, Err(error)) => {
            println!("Reading /proc for PID {pid} failed: {error}");
            return;
        }
    };

    println!("<<--- Process {pid} Stats --->>");
    println!("     {:<30}: {}", "comm", stat.comm);
    println!("     {:<30}: {}", "state", stat.state);
    println!("     {:<30}: {:.2} s", "utime", stat.utime_seconds());
    println!("     {:<30}: {:.2} s", "stime", stat.stime_seconds());
    println!("     {:<30}: {} pages", "rss", stat.rss_pages);
    println!(
        "     {:<30}: {}",
        "voluntary context switches", status.voluntary_ctxt_switches
    );
    println!(
        "     {:<30}: {}",
        "nonvoluntary context switches", status.nonvoluntary_ctxt_switches
    );
}
