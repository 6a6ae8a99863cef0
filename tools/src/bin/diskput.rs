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
use civet_err::{Error, Result};
use civet_fat::{dir::Timestamp, Target, Volume};
use clap::Parser;

/// Copy a host file into a FAT12 disk image.
///
/// With a bare FILENAME the file goes into the root directory. With a
/// DIR/FILENAME path the leading components name an existing subdirectory of
/// the image; the trailing component is the source file, which must exist in
/// the current working directory.
#[derive(Parser)]
struct Args {
    /// Path to the disk image file.
    image: PathBuf,
    /// FILENAME, or DIR/FILENAME for placement in a subdirectory.
    path: String,
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
    let (dir_path, file_name) = match args.path.rsplit_once('/') {
        Some((dir_path, file_name)) => (Some(dir_path), file_name),
        None => (None, args.path.as_str()),
    };

    let metadata =
        fs::metadata(file_name).map_err(|_| Error::InvalidInput(format!("File not found: {file_name}")))?;
    let contents = fs::read(file_name)?;
    let modified = Timestamp::from(metadata.modified()?);

    let volume = Volume::open(ImageStorage::open_rw(&args.image)?)?;
    let target = match dir_path {
        Some(dir_path) => Target::Directory(volume.resolve_dir(dir_path).map_err(|error| {
            match error {
                Error::NotFound => {
                    Error::InvalidInput(format!("No directory found with path {dir_path}"))
                }
                other => other,
            }
        })?),
        None => Target::Root,
    };

    volume.insert(target, file_name, &contents, modified)
}
