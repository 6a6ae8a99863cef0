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

/// Print identity and capacity information of a FAT12 disk image.
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
    let info = volume.info()?;

    println!("OS Name: {}", info.os_name);
    println!("Label of the disk: {}", info.volume_label);
    println!("Total size of the disk: {} bytes", info.total_bytes);
    println!("Free size of the disk: {} bytes", info.free_bytes);
    println!();
    println!("================");
    println!("The number of files in the disk: {}", info.file_count);
    println!("(including all files in the root directory and files in all subdirectories)");
    println!("================");
    println!();
    println!("Number of FAT copies: {}", info.fat_copies);
    println!("Sectors per FAT: {}", info.sectors_per_fat);

    Ok(())
}
