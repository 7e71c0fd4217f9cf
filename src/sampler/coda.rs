//! # CODA output reader
//!
//! JAGS writes the monitored draws in the CODA text format:
//!
//! * an **index** file, one line per scalar node with the 1-based, inclusive line
//!   range of its draws in every chain file:
//!
//! ```text
//! psi 1 1000
//! x[1,1] 1001 2000
//! ```
//!
//! * one **chain** file per chain, one `iteration value` pair per line.
//!
//! Both are parsed with `nom` and assembled into [`PosteriorDraws`].
use std::{ops::Range, path::Path};

use nom::{
    bytes::complete::take_while1,
    character::complete::{char, digit1, space0, space1},
    combinator::{all_consuming, map, map_res, opt},
    multi::separated_list1,
    number::complete::double,
    sequence::{delimited, preceded, terminated},
    IResult, Parser,
};
use smallvec::SmallVec;

use super::{ChainDraws, NodeKey, PosteriorDraws};
use crate::bsam_errors::SamplerError;

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || c == '.' || c == '_'
}

fn parse_usize(input: &str) -> IResult<&str, usize> {
    map_res(digit1, |s: &str| s.parse::<usize>()).parse(input)
}

fn parse_key(input: &str) -> IResult<&str, NodeKey> {
    map(
        (
            take_while1(is_name_char),
            opt(delimited(
                char('['),
                separated_list1(char(','), preceded(space0, parse_usize)),
                char(']'),
            )),
        ),
        |(name, index): (&str, Option<Vec<usize>>)| NodeKey {
            name: name.to_string(),
            index: index.map(SmallVec::from_vec).unwrap_or_default(),
        },
    )
    .parse(input)
}

fn parse_index_line(input: &str) -> IResult<&str, (NodeKey, usize, usize)> {
    all_consuming(terminated(
        (
            preceded(space0, parse_key),
            preceded(space1, parse_usize),
            preceded(space1, parse_usize),
        ),
        space0,
    ))
    .parse(input)
}

fn parse_chain_line(input: &str) -> IResult<&str, (f64, f64)> {
    all_consuming(terminated(
        (preceded(space0, double), preceded(space1, double)),
        space0,
    ))
    .parse(input)
}

/// Parse a node name such as `x[3,1]`.
pub fn parse_node_key(raw: &str) -> Result<NodeKey, SamplerError> {
    all_consuming(parse_key)
        .parse(raw.trim())
        .map(|(_, key)| key)
        .map_err(|_| SamplerError::MalformedOutput(format!("invalid node name `{raw}`")))
}

/// Parse an index file into `(node, 0-based line range)` entries.
pub fn parse_index(text: &str) -> Result<Vec<(NodeKey, Range<usize>)>, SamplerError> {
    text.lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            let (_, (key, start, end)) = parse_index_line(line).map_err(|_| {
                SamplerError::MalformedOutput(format!("invalid index line `{line}`"))
            })?;
            if start == 0 || end < start {
                return Err(SamplerError::MalformedOutput(format!(
                    "invalid line range in `{line}`"
                )));
            }
            Ok((key, start - 1..end))
        })
        .collect()
}

/// Parse a chain file, returning the values in file order.
pub fn parse_chain(text: &str) -> Result<Vec<f64>, SamplerError> {
    text.lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            parse_chain_line(line)
                .map(|(_, (_, value))| value)
                .map_err(|_| SamplerError::MalformedOutput(format!("invalid chain line `{line}`")))
        })
        .collect()
}

/// Split the values of one chain according to the index.
pub fn assemble_chain(
    index: &[(NodeKey, Range<usize>)],
    values: &[f64],
) -> Result<ChainDraws, SamplerError> {
    index
        .iter()
        .map(|(key, range)| {
            values
                .get(range.clone())
                .map(|draws| (key.clone(), draws.to_vec()))
                .ok_or_else(|| {
                    SamplerError::MalformedOutput(format!(
                        "chain holds {} values, index requests lines {}..={} for {key}",
                        values.len(),
                        range.start + 1,
                        range.end
                    ))
                })
        })
        .collect()
}

/// Read `{stem}index.txt` and `{stem}chain{k}.txt` (`k = 1..=chains`) from `dir`.
pub fn read_coda_output(
    dir: &Path,
    stem: &str,
    chains: usize,
) -> Result<PosteriorDraws, SamplerError> {
    let index_text = std::fs::read_to_string(dir.join(format!("{stem}index.txt")))?;
    let index = parse_index(&index_text)?;

    let chains = (1..=chains)
        .map(|k| {
            let text = std::fs::read_to_string(dir.join(format!("{stem}chain{k}.txt")))?;
            assemble_chain(&index, &parse_chain(&text)?)
        })
        .collect::<Result<Vec<_>, SamplerError>>()?;

    Ok(PosteriorDraws::new(chains))
}

#[cfg(test)]
mod coda_test {
    use super::*;

    #[test]
    fn test_parse_node_key() {
        assert_eq!(parse_node_key("psi").unwrap(), NodeKey::scalar("psi"));
        assert_eq!(
            parse_node_key("x[12,2]").unwrap(),
            NodeKey::indexed("x", &[12, 2])
        );
        assert_eq!(
            parse_node_key("Sigma[1, 2]").unwrap(),
            NodeKey::indexed("Sigma", &[1, 2])
        );
        assert!(parse_node_key("x[1,").is_err());
        assert!(parse_node_key("x[a]").is_err());
    }

    #[test]
    fn test_parse_index() {
        let index = parse_index("psi 1 3\nx[1,1] 4 6\n\n").unwrap();
        assert_eq!(index.len(), 2);
        assert_eq!(index[0], (NodeKey::scalar("psi"), 0..3));
        assert_eq!(index[1], (NodeKey::indexed("x", &[1, 1]), 3..6));

        assert!(parse_index("psi 0 3").is_err());
        assert!(parse_index("psi 4 3").is_err());
        assert!(parse_index("psi one three").is_err());
    }

    #[test]
    fn test_parse_chain() {
        let values = parse_chain("1001\t0.5\n1002\t-1.25e-3\n1003  7\n").unwrap();
        assert_eq!(values, vec![0.5, -0.00125, 7.0]);
        assert!(parse_chain("1001 abc").is_err());
    }

    #[test]
    fn test_assemble_chain() {
        let index = parse_index("psi 1 2\ngamma 3 4").unwrap();
        let chain = assemble_chain(&index, &[1.0, 2.0, 3.0, 4.0]).unwrap();
        assert_eq!(chain[&NodeKey::scalar("psi")], vec![1.0, 2.0]);
        assert_eq!(chain[&NodeKey::scalar("gamma")], vec![3.0, 4.0]);

        let err = assemble_chain(&index, &[1.0, 2.0, 3.0]).unwrap_err();
        assert!(matches!(err, SamplerError::MalformedOutput(_)));
    }

    #[test]
    fn test_read_coda_output() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("CODAindex.txt"), "psi 1 2\n").unwrap();
        std::fs::write(dir.path().join("CODAchain1.txt"), "1 0.1\n2 0.2\n").unwrap();
        std::fs::write(dir.path().join("CODAchain2.txt"), "1 0.3\n2 0.4\n").unwrap();

        let draws = read_coda_output(dir.path(), "CODA", 2).unwrap();
        assert_eq!(draws.n_chains(), 2);
        assert_eq!(
            draws.pooled(&NodeKey::scalar("psi")),
            Some(vec![0.1, 0.2, 0.3, 0.4])
        );

        assert!(matches!(
            read_coda_output(dir.path(), "CODA", 3),
            Err(SamplerError::Io(_))
        ));
    }
}
