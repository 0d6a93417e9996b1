//! todo-sync - command-line client for a todo list backend
//!
//! Lists todos with the same filters and pagination modes as the web
//! client, and creates, edits or deletes them through the sync layer.

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use todo_sync::assembly::AssembledList;
use todo_sync::config::Config;
use todo_sync::filters::{
    SortField, SortOrder, Tab, UpcomingCursor, ViewMode, ViewState, ViewStore, day_bounds,
};
use todo_sync::models::{NewTodo, Priority, Todo, UpdateTodo};
use todo_sync::session::ListState;
use todo_sync::{HttpTodoApi, TodoSession, TodoSync};

#[derive(Parser)]
#[command(name = "todo-sync")]
#[command(about = "Command-line client for a todo list backend")]
#[command(version)]
struct Cli {
    /// Config file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List todos
    List(ListArgs),

    /// Create a todo
    Add {
        title: String,

        /// LOW, MEDIUM or HIGH
        #[arg(short, long)]
        priority: Option<Priority>,

        /// Due date (YYYY-MM-DD)
        #[arg(short, long)]
        date: Option<NaiveDate>,

        /// Create it already completed
        #[arg(long)]
        completed: bool,
    },

    /// Edit fields of a todo
    Update {
        id: String,

        #[arg(short, long)]
        title: Option<String>,

        #[arg(short, long)]
        priority: Option<Priority>,

        /// Due date (YYYY-MM-DD)
        #[arg(short, long)]
        date: Option<NaiveDate>,

        #[arg(long)]
        completed: Option<bool>,
    },

    /// Flip the completed flag of a todo in the current list
    Toggle {
        id: String,

        #[command(flatten)]
        list: ListArgs,
    },

    /// Delete a todo
    Delete { id: String },

    /// Initialize a new config file
    Init {
        /// Output path for config file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Args)]
struct ListArgs {
    /// today, upcoming or completed
    #[arg(long, default_value = "today")]
    tab: Tab,

    /// Day shown on the upcoming tab (YYYY-MM-DD, defaults to today)
    #[arg(long)]
    day: Option<NaiveDate>,

    /// page or scroll (overrides config)
    #[arg(short, long)]
    mode: Option<ViewMode>,

    /// Page to show in page mode
    #[arg(long, default_value_t = 1)]
    page: u32,

    /// Number of scroll pages to load
    #[arg(long, default_value_t = 1)]
    pages: u32,

    /// Page size (overrides config)
    #[arg(short, long)]
    limit: Option<u32>,

    #[arg(short, long)]
    priority: Option<Priority>,

    /// Only completed (true) or open (false) todos
    #[arg(long)]
    completed: Option<bool>,

    #[arg(short, long)]
    search: Option<String>,

    /// date or priority
    #[arg(long)]
    sort: Option<SortField>,

    /// asc or desc
    #[arg(long, default_value = "desc")]
    order: SortOrder,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("todo_sync=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let load_config = || -> Result<Config> {
        match &cli.config {
            Some(path) => Ok(Config::load_from(path)?.with_env_overrides()),
            None => Config::load(),
        }
    };

    match cli.command {
        Commands::List(ref args) => {
            let cfg = load_config()?;
            let session = open_session(&cfg, args)?;
            let state = load(&session, args).await?;
            print_list(&state, args.tab);
            Ok(())
        }

        Commands::Add {
            ref title,
            priority,
            date,
            completed,
        } => {
            let cfg = load_config()?;
            let session = open_session(&cfg, &ListArgs::default())?;

            let mut new = NewTodo::new(title.as_str());
            if let Some(priority) = priority {
                new = new.with_priority(priority);
            }
            if let Some(date) = date {
                new = new.with_date(day_bounds(date, &Local).0);
            }
            if completed {
                new = new.with_completed(true);
            }

            let todo = session.create(&new).await.context("Failed to create todo")?;
            println!("Created {}", format_todo(&todo));
            Ok(())
        }

        Commands::Update {
            ref id,
            ref title,
            priority,
            date,
            completed,
        } => {
            let cfg = load_config()?;
            let session = open_session(&cfg, &ListArgs::default())?;

            let updates = UpdateTodo {
                title: title.clone(),
                completed,
                date: date.map(|date| day_bounds(date, &Local).0),
                priority,
            };
            let todo = session
                .update(id, &updates)
                .await
                .context("Failed to update todo")?;
            println!("Updated {}", format_todo(&todo));
            Ok(())
        }

        Commands::Toggle { ref id, ref list } => {
            let cfg = load_config()?;
            let session = open_session(&cfg, list)?;
            load(&session, list).await?;

            let todo = session
                .toggle_completed(id)
                .await
                .context("Failed to toggle todo")?;
            println!("Updated {}", format_todo(&todo));
            Ok(())
        }

        Commands::Delete { ref id } => {
            let cfg = load_config()?;
            let session = open_session(&cfg, &ListArgs::default())?;

            session.delete(id).await.context("Failed to delete todo")?;
            println!("Deleted todo '{}'", id);
            Ok(())
        }

        Commands::Init { output } => {
            let path = output.unwrap_or_else(|| PathBuf::from("config.toml"));
            let cfg = Config::default();
            cfg.save_to(&path)?;

            println!("Created config file: {}", path.display());
            println!();
            println!("Next steps:");
            println!("  1. Set api.base_url in config.toml to your backend");
            println!(
                "  2. List your todos: todo-sync list --config {}",
                path.display()
            );

            Ok(())
        }
    }
}

impl Default for ListArgs {
    fn default() -> Self {
        Self {
            tab: Tab::Today,
            day: None,
            mode: None,
            page: 1,
            pages: 1,
            limit: None,
            priority: None,
            completed: None,
            search: None,
            sort: None,
            order: SortOrder::Desc,
        }
    }
}

fn open_session(cfg: &Config, args: &ListArgs) -> Result<TodoSession<HttpTodoApi>> {
    let api = HttpTodoApi::from_config(&cfg.api).context("Invalid API configuration")?;
    tracing::debug!(base_url = %api.base_url(), "Using todo API");

    let store = Arc::new(ViewStore::new(ViewState {
        mode: args.mode.unwrap_or(cfg.view.mode),
        current_page: 1,
        limit: args.limit.unwrap_or(cfg.view.limit),
    }));
    store.set_current_page(args.page.max(1));
    store.set_completed(args.completed);
    store.set_priority(args.priority);
    store.set_search(args.search.clone());
    store.set_sort(args.sort);
    store.set_order(args.order);

    let sync = Arc::new(TodoSync::new(api, &cfg.cache));
    let session = TodoSession::new(store, sync);
    session.set_tab(args.tab);
    if args.tab == Tab::Upcoming {
        let day = args.day.unwrap_or_else(|| Local::now().date_naive());
        UpcomingCursor::new(Local, day).apply(session.store());
    }

    Ok(session)
}

async fn load(session: &TodoSession<HttpTodoApi>, args: &ListArgs) -> Result<ListState> {
    let mut list = session.refresh().await.context("Failed to load todos")?;
    for _ in 1..args.pages {
        if !list.has_next_page {
            break;
        }
        list = session.load_more().await.context("Failed to load more todos")?;
    }
    Ok(session.state())
}

fn print_list(state: &ListState, tab: Tab) {
    let list: &AssembledList = &state.list;

    if list.is_empty() {
        if tab == Tab::Completed {
            println!("No completed todos");
        } else if let Some(empty) = &state.empty {
            println!("{}", empty.title());
            println!("{}", empty.hint());
        }
        return;
    }

    for todo in &list.todos {
        println!("{}", format_todo(todo));
    }

    println!();
    match list.footer() {
        Some(footer) => {
            println!("{}", footer);
            println!(
                "Page {}{}{}",
                footer.current_page,
                if footer.can_prev { "  [prev]" } else { "" },
                if footer.can_next { "  [next]" } else { "" }
            );
        }
        None if list.has_next_page => {
            println!("{} todos loaded, more available (--pages)", list.count())
        }
        None => println!("{} todos", list.count()),
    }
}

fn format_todo(todo: &Todo) -> String {
    format!(
        "[{}] {}  {} ({}, {})",
        if todo.completed { "x" } else { " " },
        todo.id,
        todo.title,
        todo.priority.label(),
        todo.date.with_timezone(&Local).format("%b %-d, %Y")
    )
}
