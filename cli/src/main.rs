// This file is part of dfxd, an application to manage Dynamic Function eXchange packages together with device-tree overlays and DMA buffers.
//
// Copyright 2025 Canonical Ltd.
//
// SPDX-License-Identifier: GPL-3.0-only
//
// dfxd is free software: you can redistribute it and/or modify it under the terms of the GNU General Public License version 3, as published by the Free Software Foundation.
//
// dfxd is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranties of MERCHANTABILITY, SATISFACTORY QUALITY, or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with this program.  If not, see http://www.gnu.org/licenses/.

mod lifecycle;
mod proxies;
mod status;

use crate::lifecycle::{
    Operation, PackageOptions, init_files_handler, init_handler, lifecycle_handler,
};
use crate::status::{meta_header_handler, status_handler, uid_list_handler};
use clap::{Args, Parser, Subcommand, arg, command};
use log::debug;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "dfx")]
#[command(bin_name = "dfx")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug, Clone, Default)]
struct InitArgs {
    #[arg(
        long = "external-config",
        help = "The fabric is configured by the boot firmware, only apply the overlays"
    )]
    external_config: bool,
    #[arg(long = "user-key", help = "The bitstream is encrypted with the key in the .nky file")]
    user_key: bool,
    #[arg(long = "heap", help = "DMA heap to allocate the bitstream buffer from")]
    heap: Option<PathBuf>,
    #[arg(long = "device", help = "Device path recorded with the package")]
    device: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create a package from a directory and print its id
    Init {
        dir: PathBuf,
        #[command(flatten)]
        options: InitArgs,
    },
    /// Create a package from individual files and print its id
    InitFiles {
        #[arg(long)]
        bitstream: PathBuf,
        #[arg(long)]
        overlay: PathBuf,
        #[arg(long = "driver-overlay")]
        driver_overlay: Option<PathBuf>,
        #[arg(long)]
        key: Option<PathBuf>,
        #[command(flatten)]
        options: InitArgs,
    },
    /// Configure the FPGA and apply the image overlay of a package
    Load { id: u64 },
    /// Apply the driver overlay of a package
    DriversLoad { id: u64 },
    /// Remove the overlays of a package
    Remove { id: u64 },
    /// Release a package
    Destroy { id: u64 },
    /// Show the FPGA and either every package or the given one
    Status { id: Option<u64> },
    /// Print the active uid list of a Versal device
    UidList,
    /// Print the meta header of a Versal PDI
    MetaHeader {
        file: PathBuf,
        #[arg(long, default_value_t = 1024, help = "Largest header accepted, in words")]
        size: u32,
    },
}

impl From<&InitArgs> for PackageOptions {
    fn from(args: &InitArgs) -> Self {
        PackageOptions {
            external_config: args.external_config,
            user_key: args.user_key,
            heap: args.heap.clone(),
            device: args.device.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let cli = Cli::parse();
    debug!("parsed cli command with {cli:?}");
    let result = match &cli.command {
        Commands::Init { dir, options } => init_handler(dir, &options.into()).await,
        Commands::InitFiles {
            bitstream,
            overlay,
            driver_overlay,
            key,
            options,
        } => {
            init_files_handler(
                bitstream,
                overlay,
                driver_overlay.as_deref(),
                key.as_deref(),
                &options.into(),
            )
            .await
        }
        Commands::Load { id } => lifecycle_handler(Operation::Load, *id).await,
        Commands::DriversLoad { id } => lifecycle_handler(Operation::DriversLoad, *id).await,
        Commands::Remove { id } => lifecycle_handler(Operation::Remove, *id).await,
        Commands::Destroy { id } => lifecycle_handler(Operation::Destroy, *id).await,
        Commands::Status { id } => status_handler(*id).await,
        Commands::UidList => uid_list_handler().await,
        Commands::MetaHeader { file, size } => meta_header_handler(file, *size).await,
    };
    match result {
        Ok(msg) => println!("{msg}"),
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    }
    Ok(())
}
