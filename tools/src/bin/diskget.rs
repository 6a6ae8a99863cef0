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

use civet_ds::ImageStorage;
use civet_err::Result;
use civet_fat::Volume;
use clap::Parser;

/// Copy a file out of the root directory of a FAT12 disk image into the
/// current working directory, under its upper-cased name.
#[derive(Parser)]
struct Args {
    /// Path to the disk image file.
    image: PathBuf,
    /// File to extract, in NAME.EXT form (case-insensitive).
    filename: String,
}

fn main() {
    env_logger::init();
    let args = Args::parse();
    match run(&args) {
        Ok(()) => println!("Success!!"),
        Err(error) => {
            eprintln!("{error}");
            process::exit(1);
        }
    }
}

fn run(args: &Args) -> Result<()> {
    let volume = Volume::open(ImageStorage::open(&args.image)?)?;
    let contents = volume.extract(&args.filename)?;
    fs::write(args.filename.to_uppercase(), contents)?;

    Ok(())
}
