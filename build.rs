// build.rs

use clap::{Arg, ArgAction, Command};
use clap_mangen::Man;
use std::env;
use std::fs;
use std::path::PathBuf;

fn batch_args(cmd: Command, what: &'static str, help: &'static str) -> Command {
    cmd.arg(Arg::new(what).num_args(0..).help(help)).arg(
        Arg::new("from_file")
            .long("from-file")
            .value_name("FILE")
            .help("Read targets from a list file"),
    )
}

fn build_cli() -> Command {
    Command::new("runepkg")
        .version(env!("CARGO_PKG_VERSION"))
        .author("runepkg Contributors")
        .about("Minimal Debian-style package manager")
        .subcommand_required(false)
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Show debug output"),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .global(true)
                .value_name("PATH")
                .help("Config file to use instead of searching the default locations"),
        )
        .subcommand(
            batch_args(
                Command::new("install").about("Install .deb packages"),
                "targets",
                "Archive paths or name prefixes (\"-\" reads targets from stdin)",
            )
            .arg(
                Arg::new("force")
                    .short('f')
                    .long("force")
                    .action(ArgAction::SetTrue)
                    .help("Reinstall or upgrade, and install despite unsatisfied dependencies"),
            ),
        )
        .subcommand(batch_args(
            Command::new("remove").about("Remove installed packages"),
            "packages",
            "Package names or name-version identifiers (\"-\" reads stdin)",
        ))
        .subcommand(
            Command::new("list").about("List installed packages").arg(
                Arg::new("json")
                    .long("json")
                    .action(ArgAction::SetTrue)
                    .help("Print JSON instead of text"),
            ),
        )
        .subcommand(
            Command::new("status")
                .about("Show details of an installed package")
                .arg(Arg::new("package").required(true).help("Package name or identifier"))
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(ArgAction::SetTrue)
                        .help("Print JSON instead of text"),
                ),
        )
        .subcommand(
            Command::new("search")
                .about("Search installed packages by name")
                .arg(Arg::new("query").required(true).help("Substring to look for")),
        )
        .subcommand(Command::new("print-config").about("Print the loaded configuration"))
        .subcommand(
            Command::new("print-config-file")
                .about("Print the path of the configuration file in use"),
        )
        .subcommand(
            Command::new("completions")
                .about("Generate shell completion scripts")
                .arg(
                    Arg::new("shell")
                        .required(true)
                        .value_parser(["bash", "elvish", "fish", "powershell", "zsh"])
                        .help("Shell type"),
                ),
        )
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    // Create man directory
    let out_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").unwrap());
    let man_dir = out_dir.join("man");
    fs::create_dir_all(&man_dir).expect("Failed to create man directory");

    let cmd = build_cli();
    let man = Man::new(cmd);
    let mut buffer = Vec::new();
    man.render(&mut buffer).expect("Failed to render man page");

    let man_path = man_dir.join("runepkg.1");
    fs::write(&man_path, buffer).expect("Failed to write man page");
}
