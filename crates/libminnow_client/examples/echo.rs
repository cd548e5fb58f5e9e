//! An echo bot that repeats stuff sent to it (either in a channel, when addressed, or as a
//! direct message).

use libminnow_client::{Client, ClientInfo, Event};

use std::process::exit;

use tokio::sync::mpsc;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    // echo <nick> <server> <port> [<chan_1> .. <chan_N>]
    let mut args: Vec<String> = std::env::args().collect();
    if args.len() < 4 {
        show_usage();
        exit(1);
    }

    let nick = args.remove(1);
    let server = args.remove(1);
    let port_str = args.remove(1);
    let port = match port_str.parse::<u16>() {
        Ok(port) => port,
        Err(err) => {
            println!("Can't parse port {:?}: {}", port_str, err);
            exit(1);
        }
    };
    let chans = &args[1..];

    let (snd_ev, mut rcv_ev) = mpsc::channel(100);
    let client = Client::new(ClientInfo {
        event_handlers: vec![snd_ev],
        ..ClientInfo::default()
    });

    client
        .connect(&server, port, false)
        .await
        .expect("can't connect");
    client
        .logon("", &nick, &nick, "minnow echo bot")
        .await
        .expect("can't log on");

    while let Some(ev) = rcv_ev.recv().await {
        println!("Client event: {:?}", ev);
        match ev {
            Event::LoggedIn => {
                for chan in chans {
                    client.join(chan, None).await.unwrap();
                }
            }
            Event::Received {
                text,
                from,
                to: None,
            } => {
                // A direct message; echo it back to the sender
                client.privmsg(&from, &text).await.unwrap();
            }
            Event::Mentioned { text, to, .. } => {
                client.privmsg(&to, &text).await.unwrap();
            }
            Event::Disconnected => {
                break;
            }
            _ => {}
        }
    }
}

fn show_usage() {
    println!("echo <nick> <server> <port> [<chan_1> .. <chan_N>]");
}
