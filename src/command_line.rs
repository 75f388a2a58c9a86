//! Rebuilding a single shell command line from an argument vector.
//!
//! Shell-mediated launches hand the shell one string, so every argument
//! must be quoted such that the shell splits it back into exactly the
//! original vector.

use std::io;
use std::iter;

/// Joins `args` into one command line for the platform shell
pub fn join<'a, I>(args: I) -> io::Result<String>
where
    I: IntoIterator<Item = &'a str>,
{
    #[cfg(unix)]
    {
        join_posix(args)
    }
    #[cfg(windows)]
    {
        Ok(join_windows(args))
    }
}

/// Quotes arguments for a POSIX `sh`
///
/// Fails only for arguments containing a NUL byte, which no shell can
/// represent.
pub fn join_posix<'a, I>(args: I) -> io::Result<String>
where
    I: IntoIterator<Item = &'a str>,
{
    shlex::try_join(args).map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))
}

/// Quotes arguments following the MSVC runtime parsing rules
/// (`CommandLineToArgvW`)
pub fn join_windows<'a, I>(args: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let mut line = String::new();
    for (i, arg) in args.into_iter().enumerate() {
        if i > 0 {
            line.push(' ');
        }
        quote_windows_arg(arg, &mut line);
    }
    line
}

fn quote_windows_arg(arg: &str, out: &mut String) {
    let needs_quotes = arg.is_empty() || arg.contains([' ', '\t']);
    if needs_quotes {
        out.push('"');
    }

    let mut backslashes = 0;
    for c in arg.chars() {
        match c {
            '\\' => backslashes += 1,
            '"' => {
                // Backslashes before a quote are doubled, plus one to escape it
                out.extend(iter::repeat('\\').take(backslashes * 2 + 1));
                out.push('"');
                backslashes = 0;
            }
            _ => {
                out.extend(iter::repeat('\\').take(backslashes));
                backslashes = 0;
                out.push(c);
            }
        }
    }

    if needs_quotes {
        // Trailing backslashes would otherwise escape the closing quote
        out.extend(iter::repeat('\\').take(backslashes * 2));
        out.push('"');
    } else {
        out.extend(iter::repeat('\\').take(backslashes));
    }
}
