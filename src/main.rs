use clap::{Parser, Subcommand};
use minicoin::network::operations::send_tx;
use minicoin::{
    Block, Blockchain, CENTRAL_NODE, CoinError, GLOBAL_CONFIG, NodeContext, ProofOfWork, Result,
    Server, TXInput, TXOutput, Transaction, UTXOSet, WalletAddress, Wallets, convert_address,
    hash_pub_key,
};
use tracing::info;
use tracing_subscriber::{
    filter::{EnvFilter, LevelFilter},
    fmt,
    prelude::*,
};

#[derive(Debug, Parser)]
#[command(name = "minicoin", about = "A minimal proof-of-work cryptocurrency node")]
struct Opt {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    #[command(name = "createbc", about = "Create a chain whose genesis pays the address")]
    CreateBlockchain {
        #[arg(long)]
        address: String,
    },
    #[command(name = "createw", about = "Create a key pair and print the new address")]
    CreateWallet,
    #[command(name = "list", about = "List the addresses in the wallet file")]
    ListAddresses,
    #[command(name = "balance", about = "Print the balance of the address")]
    Balance {
        #[arg(long)]
        address: String,
    },
    #[command(name = "send", about = "Build and sign a payment; mine it locally or hand it to the central node")]
    Send {
        #[arg(long)]
        from: String,
        #[arg(long)]
        to: String,
        #[arg(long)]
        amount: i64,
        #[arg(long)]
        mine: bool,
    },
    #[command(name = "reindex", about = "Rebuild the UTXO index from the chain")]
    Reindex,
    #[command(name = "print", about = "Dump blocks from tip to genesis")]
    PrintChain,
    #[command(name = "start", about = "Start the peer listener; an address enables mining")]
    StartNode {
        #[arg(long)]
        miner: Option<String>,
    },
}

fn initialize_logging() {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();

    tracing_subscriber::registry()
        .with(fmt::layer().with_filter(filter))
        .init();
}

async fn create_blockchain(address: String) -> Result<()> {
    let address = WalletAddress::validate(address)?;
    let blockchain = Blockchain::create_blockchain(&address).await?;
    let utxo_set = UTXOSet::new(blockchain);
    utxo_set.reindex().await?;
    info!("Done! Genesis pays {}", address);
    Ok(())
}

fn create_wallet() -> Result<()> {
    let address = Wallets::new()?.create_wallet()?;
    info!("Your new address: {}", address);
    Ok(())
}

fn list_addresses() -> Result<()> {
    Wallets::new().map(|wallets| {
        wallets
            .get_addresses()
            .iter()
            .for_each(|address| info!("{}", address));
    })
}

async fn balance(address: String) -> Result<()> {
    let address = WalletAddress::validate(address)?;
    let blockchain = Blockchain::open_blockchain().await?;
    let utxo_set = UTXOSet::new(blockchain);
    let balance = utxo_set.get_balance(&address).await?;
    info!("Balance of {}: {}", address, balance);
    Ok(())
}

async fn send(from: String, to: String, amount: i64, mine: bool) -> Result<()> {
    let from = WalletAddress::validate(from)?;
    let to = WalletAddress::validate(to)?;

    let blockchain = Blockchain::open_blockchain().await?;
    let utxo_set = UTXOSet::new(blockchain.clone());

    let wallets = Wallets::new()?;
    let from_wallet = wallets
        .get_wallet(&from)
        .ok_or_else(|| CoinError::WalletNotFound(from.as_str().to_string()))?;

    let tx = Transaction::new_utxo_transaction(from_wallet, &to, amount, &utxo_set).await?;

    if mine {
        // Local mining: the sender also collects the block subsidy.
        let coinbase_tx = Transaction::new_coinbase_tx(&from, None)?;
        let block = blockchain.mine_block(&[coinbase_tx, tx]).await?;
        utxo_set.update(&block).await?;
        info!("Mined block {}", block.get_hash());
    } else {
        let ctx = NodeContext::new(blockchain);
        send_tx(&ctx, &CENTRAL_NODE, &tx).await;
        info!("Handed transaction {} to the central node", tx.get_tx_id_hex());
    }
    info!("Success!");
    Ok(())
}

async fn reindex() -> Result<()> {
    let blockchain = Blockchain::open_blockchain().await?;
    let utxo_set = UTXOSet::new(blockchain);
    utxo_set.reindex().await?;
    let count = utxo_set.count_transactions().await?;
    info!("Done! There are {} transactions in the UTXO index.", count);
    Ok(())
}

fn format_transaction_input(input: &TXInput) -> String {
    let pub_key_hash = hash_pub_key(input.get_pub_key());
    format!(
        "-- Input txid = {}, vout = {}, from = {}",
        input.get_input_tx_id_hex(),
        input.get_vout(),
        convert_address(pub_key_hash.as_slice()),
    )
}

fn format_transaction_output(output: &TXOutput) -> String {
    format!(
        "-- Output value = {}, to = {}",
        output.get_value(),
        convert_address(output.get_pub_key_hash()),
    )
}

fn print_transaction(tx: &Transaction) {
    info!("- Transaction {}", tx.get_tx_id_hex());
    if !tx.is_coinbase() {
        tx.get_vin()
            .iter()
            .map(format_transaction_input)
            .for_each(|line| info!("{}", line));
    }
    tx.get_vout()
        .iter()
        .map(format_transaction_output)
        .for_each(|line| info!("{}", line));
}

fn print_block(block: &Block) {
    info!("Pre block hash: {}", block.get_pre_block_hash());
    info!("Cur block hash: {}", block.get_hash());
    info!("Height: {}", block.get_height());
    info!("Timestamp: {}", block.get_timestamp());
    let pow = ProofOfWork::new_proof_of_work(block.clone());
    info!("PoW valid: {}", pow.validate());
    block.get_transactions().iter().for_each(print_transaction);
}

async fn print_chain() -> Result<()> {
    let blockchain = Blockchain::open_blockchain().await?;
    let mut iterator = blockchain.iterator().await;
    while let Some(block) = iterator.next() {
        print_block(&block);
    }
    Ok(())
}

async fn start_node(miner: Option<String>) -> Result<()> {
    if let Some(miner) = miner {
        let mining_addr = WalletAddress::validate(miner)?;
        GLOBAL_CONFIG.set_mining_addr(&mining_addr)?;
        info!("Mining enabled, rewards go to {}", mining_addr);
    }

    let node_addr = GLOBAL_CONFIG.node_addr()?;
    let blockchain = match Blockchain::open_blockchain().await {
        Ok(blockchain) => blockchain,
        Err(CoinError::ChainNotInitialized(_)) if node_addr != *CENTRAL_NODE => {
            // A fresh peer starts empty and catches up from the central node.
            Blockchain::open_empty().await?
        }
        Err(e) => return Err(e),
    };
    UTXOSet::new(blockchain.clone()).reindex().await?;

    info!("Starting node at {}", node_addr);
    let server = Server::new(NodeContext::new(blockchain));
    server.run().await
}

async fn process_command(command: Command) -> Result<()> {
    match command {
        Command::CreateBlockchain { address } => create_blockchain(address).await,
        Command::CreateWallet => create_wallet(),
        Command::ListAddresses => list_addresses(),
        Command::Balance { address } => balance(address).await,
        Command::Send {
            from,
            to,
            amount,
            mine,
        } => send(from, to, amount, mine).await,
        Command::Reindex => reindex().await,
        Command::PrintChain => print_chain().await,
        Command::StartNode { miner } => start_node(miner).await,
    }
}

#[tokio::main]
async fn main() {
    initialize_logging();

    let opt = Opt::parse();
    if let Err(e) = process_command(opt.command).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
