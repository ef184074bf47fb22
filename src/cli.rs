use clap::{Parser, Subcommand};
use std::time::Duration;

use crate::context::AppContext;
use crate::models::auth::AuthNotice;
use crate::models::comments::CommentsView;
use crate::models::votes::RatingSummary;
use crate::services::comments::CommentThread;

#[derive(Parser, Debug)]
#[command(name = "reelshelf")]
#[command(version)]
#[command(about = "Browse movies, keep favorites, rate and comment")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Logging level {off, error, warn, info, debug, trace}; RUST_LOG overrides it
    #[arg(long = "loglevel", default_value = "warn", global = true)]
    pub log_level: String,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Show a movie with its rating and comments
    Movie {
        id: i64,
        /// Keep running and print comment and rating changes as they arrive
        #[arg(long)]
        follow: bool,
    },
    /// List favorites
    Favorites,
    /// Add a movie to favorites, or remove it if already there
    Favorite { id: i64 },
    /// Remove a movie from favorites
    Unfavorite { id: i64 },
    /// Remove every favorite
    ClearFavorites,
    SignIn {
        email: String,
        password: String,
    },
    SignUp {
        full_name: String,
        email: String,
        password: String,
    },
    SignOut,
    /// Show the signed-in user
    Whoami,
    /// Rate a movie from 0.5 to 5 in half steps
    Rate { movie_id: i64, rating: f64 },
    /// Remove your rating of a movie
    Unrate { movie_id: i64 },
    Comment { movie_id: i64, content: String },
    EditComment {
        movie_id: i64,
        comment_id: i64,
        content: String,
    },
    DeleteComment { movie_id: i64, comment_id: i64 },
}

impl Command {
    pub async fn execute(self, ctx: &AppContext) -> Result<(), String> {
        match self {
            Command::Movie { id, follow } => show_movie(ctx, id, follow).await,
            Command::Favorites => {
                let favorites = ctx.favorites.list().await;
                if favorites.is_empty() {
                    println!("No favorites yet");
                }
                for f in favorites {
                    println!(
                        "{:>8}  {} ({})",
                        f.id,
                        f.title,
                        f.release_date.as_deref().unwrap_or("unknown")
                    );
                }
                Ok(())
            }
            Command::Favorite { id } => {
                let catalog = ctx.catalog()?;
                let movie = catalog.fetch_movie(id).await?;
                if ctx.favorites.toggle(catalog.favorite_for(&movie)).await? {
                    println!("Added {} to favorites", movie.title);
                } else {
                    println!("Removed {} from favorites", movie.title);
                }
                Ok(())
            }
            Command::Unfavorite { id } => {
                if !ctx.favorites.remove(id).await? {
                    println!("Movie {} is not a favorite", id);
                }
                Ok(())
            }
            Command::ClearFavorites => {
                ctx.favorites.clear().await?;
                Ok(())
            }
            Command::SignIn { email, password } => {
                report(ctx.auth.sign_in(&email, &password).await)
            }
            Command::SignUp {
                full_name,
                email,
                password,
            } => report(ctx.auth.sign_up(&full_name, &email, &password).await),
            Command::SignOut => ctx.auth.sign_out().await,
            Command::Whoami => {
                match ctx.auth.current_user().await {
                    Some(user) => println!(
                        "{} <{}>",
                        user.full_name.as_deref().unwrap_or("(no name)"),
                        user.email.as_deref().unwrap_or("no email")
                    ),
                    None => println!("Not signed in"),
                }
                Ok(())
            }
            Command::Rate { movie_id, rating } => {
                let user = ctx.require_user("rate movies").await?;
                let mut user_rating = ctx.user_rating(movie_id, &user.id).await;
                if !user_rating.save(rating).await {
                    return Err(user_rating.error().unwrap_or("Failed to save rating").to_string());
                }
                println!("Rated {} / 5", user_rating.value());
                Ok(())
            }
            Command::Unrate { movie_id } => {
                let user = ctx.require_user("rate movies").await?;
                let mut user_rating = ctx.user_rating(movie_id, &user.id).await;
                if !user_rating.delete().await {
                    return Err(user_rating.error().unwrap_or("Failed to delete rating").to_string());
                }
                Ok(())
            }
            Command::Comment { movie_id, content } => {
                let user = ctx.require_user("comment").await?;
                let thread = ctx.comments(movie_id).await;
                let ok = thread.add(&content, &user.id).await;
                finish(&thread, ok).await
            }
            Command::EditComment {
                movie_id,
                comment_id,
                content,
            } => {
                let user = ctx.require_user("edit comments").await?;
                let thread = ctx.comments(movie_id).await;
                let ok = thread.update(comment_id, &content, &user.id).await;
                finish(&thread, ok).await
            }
            Command::DeleteComment {
                movie_id,
                comment_id,
            } => {
                let user = ctx.require_user("delete comments").await?;
                let thread = ctx.comments(movie_id).await;
                let ok = thread.delete(comment_id, &user.id).await;
                finish(&thread, ok).await
            }
        }
    }
}

fn report(notice: AuthNotice) -> Result<(), String> {
    if notice.is_success() {
        println!("{}", notice.message);
        Ok(())
    } else {
        Err(notice.message)
    }
}

async fn finish(thread: &CommentThread, ok: bool) -> Result<(), String> {
    let view = thread.snapshot().await;
    if !ok {
        return Err(view.error.unwrap_or_else(|| "Comment request failed".to_string()));
    }
    print_comments(&view);
    Ok(())
}

async fn show_movie(ctx: &AppContext, id: i64, follow: bool) -> Result<(), String> {
    match ctx.catalog() {
        Ok(catalog) => {
            let movie = catalog.fetch_movie(id).await?;
            println!(
                "{} ({})",
                movie.title,
                movie.release_year().unwrap_or("n/a")
            );
            if let Some(runtime) = movie.runtime {
                println!("{} min", runtime);
            }
            if !movie.genres.is_empty() {
                let genres: Vec<&str> = movie.genres.iter().map(|g| g.name.as_str()).collect();
                println!("{}", genres.join(", "));
            }
            println!("{}", catalog.poster_url(movie.poster_path.as_deref()));
            if !movie.overview.is_empty() {
                println!("\n{}\n", movie.overview);
            }
            if ctx.favorites.contains(id).await {
                println!("In your favorites");
            }
        }
        Err(e) => log::warn!("[cli] {}", e),
    }

    let average = ctx.average_rating(id).await;
    let comments = ctx.comments(id).await;
    if let Some(user) = ctx.session.user().await {
        let mine = ctx.user_rating(id, &user.id).await;
        if mine.value() > 0.0 {
            println!("Your rating: {}", mine.value());
        }
    }

    let mut last_summary = average.summary().await;
    let mut last_view = comments.snapshot().await;
    print_summary(&last_summary);
    print_comments(&last_view);

    if !follow {
        return Ok(());
    }

    println!("Following changes, press Ctrl-C to stop");
    let mut tick = tokio::time::interval(Duration::from_millis(500));
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    loop {
        tokio::select! {
            _ = &mut ctrl_c => break,
            _ = tick.tick() => {
                let summary = average.summary().await;
                if summary != last_summary {
                    print_summary(&summary);
                    last_summary = summary;
                }
                let view = comments.snapshot().await;
                if view.comments != last_view.comments {
                    print_comments(&view);
                    last_view = view;
                }
            }
        }
    }
    Ok(())
}

fn print_summary(summary: &RatingSummary) {
    match summary.average {
        Some(avg) => println!("Rating: {:.1} / 5 ({} votes)", avg, summary.total),
        None => println!("No ratings yet"),
    }
}

fn print_comments(view: &CommentsView) {
    if let Some(error) = &view.error {
        println!("Comments unavailable: {}", error);
        return;
    }
    println!("{} comments", view.comments.len());
    for c in &view.comments {
        println!(
            "  #{} {} ({}): {}",
            c.id(),
            c.display_name(),
            c.comment.created_at,
            c.comment.content
        );
    }
}
