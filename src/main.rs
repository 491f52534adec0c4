mod utils;

#[derive(Debug, thiserror::Error)]
enum AppError {
    #[error("Missing required arguments")]
    MissingArguments,
    #[error("Target is not an existing file")]
    TargetNotFile,
    #[error("Flags must be introduced with '-'")]
    FlagSyntax,
    #[error("Unknown flag '{0}'")]
    UnknownFlag(char),
    #[error("Missing <date> <time> <zone> arguments")]
    MissingStamp,
    #[error("Invalid date/time: {0}")]
    InvalidStamp(String),
    #[error("Accessor failure: {0}")]
    Accessor(#[from] utils::accessor::AccessorError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Update {
    Modification,
    Access,
    MftChange,
    Creation,
}

#[derive(Debug)]
enum Request {
    Show {
        path: std::path::PathBuf,
    },
    Apply {
        path: std::path::PathBuf,
        print: bool,
        updates: Vec<Update>,
        stamp: chrono::NaiveDateTime,
    },
}

impl Request {
    fn parse(arguments: &[String]) -> Result<Self, AppError> {
        let (target, flags) = match arguments {
            [target, flags, ..] => (target, flags),
            _ => return Err(AppError::MissingArguments),
        };

        let path = std::path::PathBuf::from(target);
        if !path.is_file() {
            return Err(AppError::TargetNotFile);
        }

        let letters = flags.strip_prefix('-').ok_or(AppError::FlagSyntax)?;

        let mut print = false;
        let mut updates = Vec::new();
        for letter in letters.chars() {
            match letter {
                'p' => print = true,
                'm' => updates.push(Update::Modification),
                'a' => updates.push(Update::Access),
                'c' => updates.push(Update::MftChange),
                'b' => updates.push(Update::Creation),
                unknown => return Err(AppError::UnknownFlag(unknown)),
            }
        }

        if print && updates.is_empty() {
            return Ok(Request::Show { path });
        }

        let stamp = match &arguments[2..] {
            [date, time, zone, ..] => parse_stamp(date, time, zone)?,
            _ => return Err(AppError::MissingStamp),
        };

        Ok(Request::Apply {
            path,
            print,
            updates,
            stamp,
        })
    }
}

fn parse_stamp(date: &str, time: &str, zone: &str) -> Result<chrono::NaiveDateTime, AppError> {
    let local =
        chrono::NaiveDateTime::parse_from_str(&format!("{} {}", date, time), "%Y/%m/%d %H:%M:%S")
            .map_err(|_| AppError::InvalidStamp(format!("{} {}", date, time)))?;

    let offset = parse_zone(zone).ok_or_else(|| AppError::InvalidStamp(zone.to_owned()))?;

    match local.and_local_timezone(offset).single() {
        Some(zoned) => Ok(zoned.naive_utc()),
        None => Err(AppError::InvalidStamp(format!("{} {} {}", date, time, zone))),
    }
}

fn parse_zone(zone: &str) -> Option<chrono::FixedOffset> {
    if matches!(zone, "UTC" | "GMT" | "Z" | "z") {
        return chrono::FixedOffset::east_opt(0);
    }

    let (sign, rest) = if let Some(rest) = zone.strip_prefix('+') {
        (1, rest)
    } else if let Some(rest) = zone.strip_prefix('-') {
        (-1, rest)
    } else {
        return None;
    };

    if !rest.bytes().all(|byte| byte.is_ascii_digit() || byte == b':') {
        return None;
    }

    let (hours, minutes) = match rest.split_once(':') {
        Some(split) => split,
        None if rest.len() == 4 => rest.split_at(2),
        None => return None,
    };
    if hours.len() != 2 || minutes.len() != 2 {
        return None;
    }

    let hours: i32 = hours.parse().ok()?;
    let minutes: i32 = minutes.parse().ok()?;
    if minutes >= 60 {
        return None;
    }

    chrono::FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

fn execute<A: utils::accessor::TimestampAccessor>(
    accessor: &mut A,
    request: &Request,
) -> Result<(), AppError> {
    match request {
        Request::Show { path } => print_times(accessor, path),
        Request::Apply {
            path,
            print,
            updates,
            stamp,
        } => {
            if *print {
                print_times(accessor, path)?;
            }

            let ticks = utils::windows::time::Ticks::from(*stamp);
            for update in updates {
                match update {
                    Update::Modification => {
                        accessor.set(utils::accessor::TimestampKind::Modification, path, ticks)?
                    }
                    Update::Access => {
                        accessor.set(utils::accessor::TimestampKind::Access, path, ticks)?
                    }
                    Update::Creation => {
                        accessor.set(utils::accessor::TimestampKind::Creation, path, ticks)?
                    }
                    Update::MftChange => println!("c (MFT change) not implemented yet"),
                }
            }

            if *print {
                println!("times for {} changed to: ", path.display());
                print_times(accessor, path)?;
            }

            Ok(())
        }
    }
}

fn print_times<A: utils::accessor::TimestampAccessor>(
    accessor: &mut A,
    path: &std::path::Path,
) -> Result<(), AppError> {
    let access = accessor.get(utils::accessor::TimestampKind::Access, path)?;
    let modification = accessor.get(utils::accessor::TimestampKind::Modification, path)?;
    let birth = accessor.get(utils::accessor::TimestampKind::Creation, path)?;

    println!("access_time:       {}", chrono::NaiveDateTime::from(access));
    println!(
        "modification_time: {}",
        chrono::NaiveDateTime::from(modification)
    );
    println!("birth_time:        {}", chrono::NaiveDateTime::from(birth));

    Ok(())
}

fn usage() -> ! {
    let program = std::env::args().next().unwrap_or("filestamp-rs".to_owned());
    eprintln!("usage:   {} path -[pmacb] [<date> <time> <zone>]", program);
    eprintln!("example: {} test.txt -ma 2000/02/28 13:03:30 UTC", program);
    std::process::exit(1);
}

fn run() -> Result<(), AppError> {
    let arguments: Vec<String> = std::env::args().skip(1).collect();
    let request = Request::parse(&arguments)?;
    log_debug!("request: {:?}", request);

    let mut accessor = utils::accessor::AccessorProcess::launch()?;
    let outcome = execute(&mut accessor, &request);
    let shutdown = accessor.close();

    // The plan's failure outranks a shutdown failure.
    outcome?;
    shutdown?;
    Ok(())
}

fn main() {
    #[cfg(feature = "logging")]
    utils::logging::init();

    if let Err(error) = run() {
        if let AppError::Accessor(failure) = &error {
            eprintln!("error: {}", failure);
            std::process::exit(1);
        }

        log_debug!("rejected invocation: {}", error);
        usage();
    }
}
