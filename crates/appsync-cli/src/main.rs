//! AppSync 실시간 구독 CLI.
//!
//! # 사용 예시
//!
//! ```bash
//! # 설정 확인 (실시간 URL 출력)
//! appsync check-config -c config/realtime.toml
//!
//! # 구독 실행 (Ctrl-C로 종료)
//! appsync subscribe -c config/realtime.toml \
//!     -q 'subscription OnCreate { onCreateTodo { id name } }'
//!
//! # 파일에서 쿼리를 읽고 60초 후 종료
//! appsync subscribe -c config/realtime.toml -q @queries/on_create.graphql \
//!     --variables '{"owner":"alice"}' --duration-secs 60
//! ```

use clap::{Parser, Subcommand};
use tracing::error;

mod commands;

use commands::check_config::check_config;
use commands::subscribe::{run_subscribe, SubscribeConfig};

#[derive(Parser)]
#[command(name = "appsync")]
#[command(about = "AppSync realtime CLI - GraphQL 구독 실행 도구", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// GraphQL 구독을 실행하고 이벤트를 JSON 줄로 출력
    Subscribe {
        /// 설정 파일 (TOML, JSON, YAML)
        #[arg(short, long, default_value = "config/realtime.toml")]
        config: String,

        /// 구독 ID (기본: 무작위 UUID)
        #[arg(long)]
        id: Option<String>,

        /// GraphQL 구독 문서 또는 `@파일경로`
        #[arg(short, long)]
        query: String,

        /// GraphQL 변수 (JSON 객체)
        #[arg(long)]
        variables: Option<String>,

        /// 실행 시간 (초, 지정하지 않으면 Ctrl-C까지)
        #[arg(long)]
        duration_secs: Option<u64>,
    },

    /// 설정 파일 검증 및 실시간 URL 확인
    CheckConfig {
        /// 설정 파일 (TOML, JSON, YAML)
        #[arg(short, long, default_value = "config/realtime.toml")]
        config: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env 파일은 선택 사항
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Subscribe {
            config,
            id,
            query,
            variables,
            duration_secs,
        } => {
            run_subscribe(SubscribeConfig {
                config_path: config,
                id,
                query,
                variables,
                duration_secs,
            })
            .await
        }
        Commands::CheckConfig { config } => check_config(&config),
    };

    if let Err(e) = &result {
        error!("Command failed: {:#}", e);
    }
    result
}
