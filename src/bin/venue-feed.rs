use anyhow::{Context, Result};
use clap::Parser;
use venue_feed::{VenueCategory, VenueFeed, VenueQuery};

#[derive(Parser)]
#[command(name = "venue-feed")]
#[command(about = "Print one page of aggregated venues for a location")]
#[command(version = "0.1.0")]
struct Cli {
    /// Location to search, e.g. "Minneapolis, MN"
    location: String,
    /// Number of venues to return
    #[arg(default_value_t = 20)]
    count: usize,
    /// Restrict the feed to one category: restaurant, activity or event
    #[arg(value_parser = parse_category)]
    category: Option<VenueCategory>,
    /// Caller identity used for rate limiting
    #[arg(long, default_value = "cli")]
    caller: String,
    /// Ids already shown (comma-separated)
    #[arg(long, value_delimiter = ',')]
    exclude: Vec<String>,
    /// Top up a short category page with placeholder venues
    #[arg(long)]
    fallback: bool,
}

fn parse_category(raw: &str) -> Result<VenueCategory, String> {
    VenueCategory::parse(raw).map_err(|err| err.to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let feed = VenueFeed::from_env().context("failed to build venue feed")?;
    let mut query = VenueQuery::new(cli.location, cli.count).excluding(cli.exclude);
    if let Some(category) = cli.category {
        query = query.in_category(category);
    }

    let page = if cli.fallback {
        feed.next_venues_or_fallback(&cli.caller, &query).await?
    } else {
        feed.next_venues(&cli.caller, &query).await?
    };
    println!("{}", serde_json::to_string_pretty(&page)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn parses_positionals_and_flags() {
        Cli::command().debug_assert();

        let cli = Cli::try_parse_from([
            "venue-feed",
            "Duluth, MN",
            "12",
            "events",
            "--exclude",
            "yelp-1,google-2",
        ])
        .unwrap();
        assert_eq!(cli.location, "Duluth, MN");
        assert_eq!(cli.count, 12);
        assert_eq!(cli.category, Some(VenueCategory::Event));
        assert_eq!(cli.exclude, vec!["yelp-1", "google-2"]);
        assert_eq!(cli.caller, "cli");
        assert!(!cli.fallback);
    }

    #[test]
    fn defaults_count_and_rejects_unknown_category() {
        let cli = Cli::try_parse_from(["venue-feed", "Fargo, ND"]).unwrap();
        assert_eq!(cli.count, 20);
        assert_eq!(cli.category, None);

        assert!(Cli::try_parse_from(["venue-feed", "Fargo, ND", "5", "museums"]).is_err());
    }
}
