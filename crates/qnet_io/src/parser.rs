//! Parser for traffic description files.
//!
//! Each non-empty line describes one path from Alice to Bob:
//!
//! ```text
//! # alice -> repeater -> bob
//! (0, 0) -> (0, 1) -> (1, 1)
//! (2, 0) (2, 1)
//! ```
//!
//! Coordinates are only checked for syntax here. Whether they exist in the
//! grid and form a valid path is decided when the simulation is built.

use anyhow::{Context, Result, anyhow};
use nom::IResult;
use nom::branch::alt;
use nom::bytes::complete::tag;
use nom::character::complete::{char, digit1, space0, space1};
use nom::combinator::{all_consuming, map, map_res};
use nom::multi::separated_list1;
use nom::sequence::{delimited, separated_pair};
use qnet_common::Coord;
use std::fs;
use std::path::Path;

fn number(input: &str) -> IResult<&str, u16> {
    map_res(digit1, |s: &str| s.parse::<u16>())(input)
}

fn coord(input: &str) -> IResult<&str, Coord> {
    map(
        delimited(
            char('('),
            separated_pair(
                delimited(space0, number, space0),
                char(','),
                delimited(space0, number, space0),
            ),
            char(')'),
        ),
        |(row, col)| Coord::new(row, col),
    )(input)
}

fn separator(input: &str) -> IResult<&str, &str> {
    alt((delimited(space0, tag("->"), space0), space1))(input)
}

fn path(input: &str) -> IResult<&str, Vec<Coord>> {
    delimited(space0, separated_list1(separator, coord), space0)(input)
}

/// Parses a single traffic line, without comment.
pub fn parse_path(line: &str) -> Result<Vec<Coord>> {
    all_consuming(path)(line)
        .map(|(_, coords)| coords)
        .map_err(|e| anyhow!("malformed path {line:?}: {e}"))
}

/// Parses the contents of a traffic file.
///
/// # Returns
///
/// One coordinate list per path in file order, or an error naming the first
/// malformed line.
pub fn parse_traffic(text: &str) -> Result<Vec<Vec<Coord>>> {
    let mut paths = Vec::new();
    for (i, raw) in text.lines().enumerate() {
        let line = raw.split('#').next().unwrap_or_default().trim();
        if line.is_empty() {
            continue;
        }
        let coords = parse_path(line).with_context(|| format!("line {}", i + 1))?;
        paths.push(coords);
    }
    Ok(paths)
}

/// Loads a traffic file from disk.
pub fn load_traffic<P: AsRef<Path>>(path: P) -> Result<Vec<Vec<Coord>>> {
    let path = path.as_ref();
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to open traffic file {}", path.display()))?;
    parse_traffic(&text).with_context(|| format!("Failed to parse {}", path.display()))
}

/// Renders paths in the traffic file format, one per line.
pub fn format_traffic(paths: &[Vec<Coord>]) -> String {
    let mut out = String::new();
    for p in paths {
        let line: Vec<String> = p.iter().map(|c| format!("({}, {})", c.row, c.col)).collect();
        out.push_str(&line.join(" -> "));
        out.push('\n');
    }
    out
}

/// Writes paths to a traffic file.
pub fn save_traffic<P: AsRef<Path>>(path: P, paths: &[Vec<Coord>]) -> Result<()> {
    let path = path.as_ref();
    fs::write(path, format_traffic(paths))
        .with_context(|| format!("Failed to write traffic file {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn c(row: u16, col: u16) -> Coord {
        Coord::new(row, col)
    }

    #[test]
    fn arrows_spaces_and_comments() {
        let text = "\
# two paths
(0, 0) -> (0, 1) -> (1, 1)   # with repeater

  (2,0)(2,1)
(3 ,4) (4, 4)
";
        let paths = parse_traffic(text);
        // Adjacent coordinates without a separator are not accepted.
        assert!(paths.is_err());

        let text = text.replace("(2,0)(2,1)", "(2,0) (2,1)");
        let paths = parse_traffic(&text).unwrap();
        assert_eq!(
            paths,
            vec![
                vec![c(0, 0), c(0, 1), c(1, 1)],
                vec![c(2, 0), c(2, 1)],
                vec![c(3, 4), c(4, 4)],
            ]
        );
    }

    #[test]
    fn single_node_lines_parse() {
        // Length is a topology question, not a syntax one.
        assert_eq!(parse_path("(1, 1)").unwrap(), vec![c(1, 1)]);
    }

    #[test]
    fn errors_name_the_line() {
        let err = parse_traffic("(0, 0) (0, 1)\n(0, x)\n").unwrap_err();
        assert!(format!("{err:#}").contains("line 2"));
        assert!(parse_path("(0, 0) ->").is_err());
        assert!(parse_path("(70000, 0) (0, 0)").is_err());
    }

    #[test]
    fn formatted_traffic_parses_back() {
        let paths = vec![vec![c(0, 0), c(1, 0), c(1, 1)], vec![c(4, 2), c(3, 2)]];
        assert_eq!(parse_traffic(&format_traffic(&paths)).unwrap(), paths);
    }
}
