//! Umsflash command line interface.

use std::process;

use clap::{
    crate_authors, crate_description, crate_name, crate_version, value_t, App, AppSettings::*, Arg,
};
use console::style;
use log::{debug, error, trace, LevelFilter};
use simplelog::*;

use umsflash::{self as uf, ProvisionError};

fn main() {
    println!("[UF] umsflash v{}", crate_version!());

    ctrlc::set_handler(move || {
        println!("🛑 received Ctrl+C!");
        process::exit(0);
    })
    .expect("Failed to install my Ctrl-C handler!");

    let matches = App::new(crate_name!())
        .version(format!("v{}", crate_version!()).as_str())
        .author(crate_authors!())
        .about(crate_description!())
        .long_about(
            "\n\
            Umsflash watches the U-Boot console of the board on the serial \
            port. When the board finishes bringing up its USB gadget it stops \
            autoboot and starts USB mass storage mode:\n\
               \t* waits for the host to mount the new volume \n\
               \t* picks the volume holding a `*-m4.dtb` file \n\
               \t* copies the artifact onto it and checks its sha256 \n\
               \t* unmounts the volume \n\
               \t* leaves UMS mode and boots the board \n\
            \n\
            Start umsflash before powering the board on. It keeps running \
            after the board booted; stop it with Ctrl+C.\
        ",
        )
        .max_term_width(80)
        .setting(ColoredHelp)
        .setting(NextLineHelp)
        .arg(
            Arg::with_name("PORT")
                .help("the serial port connected to the board console")
                .required(true)
                .index(1),
        )
        .arg(
            Arg::with_name("ARTIFACT")
                .help("path to the M4 artifact to be flashed")
                .required(true)
                .index(2),
        )
        .arg(
            Arg::with_name("BAUD_RATE")
                .help("serial port baud rate")
                .short("-b")
                .long("--baud-rate")
                .takes_value(true)
                .default_value("115200")
                .require_equals(true),
        )
        .arg(
            Arg::with_name("FORCE")
                .help("force-stop UMS after copy verification")
                .long_help(
                    "consider the volume released as soon as one unmount \
                     attempt failed, instead of retrying for up to a minute.",
                )
                .short("-f")
                .long("--force"),
        )
        .arg(
            Arg::with_name("EXIT_AFTER_BOOT")
                .help("exit once the boot command was sent")
                .long("--exit-after-boot"),
        )
        .arg(Arg::with_name("v").short("v").multiple(true).help(
            "Sets the logging level of verbosity, repeat several times for \
                higher verbosity; `-v` also echoes the board console",
        ))
        .get_matches();

    let log_level = match matches.occurrences_of("v") {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };

    TermLogger::init(
        log_level,
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )
    .unwrap();

    trace!("{:#?}", matches);

    let baud_rate = value_t!(matches.value_of("BAUD_RATE"), u32).unwrap_or_else(|_| {
        println!(
            "{}: `{}` needs to be a numeric value",
            style("error").red(),
            style("baud-rate").cyan()
        );
        println!(
            "   {} `{}` is not a valid value",
            style("-->").cyan(),
            style(matches.value_of("BAUD_RATE").unwrap_or_default()).on_red()
        );
        process::exit(-1);
    });

    // Both are required, clap already refused to go on without them.
    let port = matches.value_of("PORT").unwrap_or_default();
    let artifact = matches.value_of("ARTIFACT").unwrap_or_default();

    let settings = uf::SettingsBuilder::default()
        .path(port)
        .baud_rate(baud_rate)
        .artifact(artifact)
        .force_unmount(matches.is_present("FORCE"))
        .exit_after_boot(matches.is_present("EXIT_AFTER_BOOT"))
        .echo_console(matches.occurrences_of("v") > 0)
        .finalize();

    // Run the state machine ===================================================

    let exit_code = match uf::provision(settings) {
        Ok(()) => 0,
        Err(e) => {
            error!("{}", e);
            println!("{}", style(format!("[UF] 💥 {}", e)).red());
            if let ProvisionError::IntegrityMismatch { .. } = e {
                println!("[UF] 🔌 The copy on the board is corrupt, power cycle and try again!");
            }
            1
        }
    };
    debug!("exit code: {}", exit_code);
    process::exit(exit_code);
}
