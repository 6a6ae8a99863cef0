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

use std::{path::PathBuf, process};

use civet_ds::ImageStorage;
use civet_err::Result;
use civet_fat::Volume;
use clap::Parser;

const SEPARATOR: &str = "===========================================";

/// List every root and subdirectory entry of a FAT12 disk image.
#[derive(Parser)]
struct Args {
    /// Path to the disk image file.
    image: PathBuf,
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
    let volume = Volume::open(ImageStorage::open(&args.image)?)?;

    for (index, listing) in volume.list()?.iter().enumerate() {
        if index > 0 {
            println!();
        }
        println!("{}", listing.path);
        println!("{SEPARATOR}");
        for entry in &listing.entries {
            let kind = if entry.directory { 'D' } else { 'F' };
            let created = entry.created;
            println!(
                "{kind} {:<10} {:<20} {:04}-{:02}-{:02} {:02}:{:02}",
                entry.size,
                entry.name,
                created.year,
                created.month,
                created.day,
                created.hour,
                created.minute
            );
            println!();
        }
    }

    Ok(())
}
