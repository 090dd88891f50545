//! UDP Command Listener
//!
//! Binds one UDP socket on the given stack, receives one datagram at a time and
//! dispatches it inline through a [`RoverController`]. There is no queue and
//! no reply channel; a silent peer leaves the actuators at their last state.

use core::convert::Infallible;

use embassy_net::{
    udp::{BindError, PacketMetadata, UdpSocket},
    IpEndpoint, Stack,
};

use super::command::MAX_FRAME_LEN;
use crate::utils::controllers::{DispatchError, MotorActuator, RoverController, ServoActuator};

/// Dispatch one datagram and log the outcome.
pub fn serve_datagram<M, S>(
    rover: &mut RoverController<M, S>,
    frame: &[u8],
    peer: IpEndpoint,
) -> Result<(), DispatchError>
where
    M: MotorActuator,
    S: ServoActuator,
{
    match rover.handle_frame(frame) {
        Ok(command) => {
            tracing::info!(%peer, ?command, "command applied");
            Ok(())
        }
        Err(DispatchError::Frame(error)) => {
            tracing::warn!(%peer, %error, "frame dropped");
            Err(DispatchError::Frame(error))
        }
        Err(DispatchError::Actuator(error)) => {
            tracing::error!(%peer, %error, "command partially applied");
            Err(DispatchError::Actuator(error))
        }
    }
}

/// Serve commands on `port` forever.
///
/// Only returns if the socket cannot be bound.
pub async fn run<M, S>(
    stack: Stack<'static>,
    port: u16,
    rover: &mut RoverController<M, S>,
) -> Result<Infallible, BindError>
where
    M: MotorActuator,
    S: ServoActuator,
{
    let (mut rx_meta, mut tx_meta) = ([PacketMetadata::EMPTY; 4], [PacketMetadata::EMPTY; 1]);
    let (mut rx_buffer, mut tx_buffer) = ([0; 512], [0; 64]);

    let mut socket = UdpSocket::new(
        stack,
        &mut rx_meta,
        &mut rx_buffer,
        &mut tx_meta,
        &mut tx_buffer,
    );
    socket.bind(port)?;

    if let Some(ip_cfg) = stack.config_v4() {
        tracing::info!("UDP listener at {}:{}", ip_cfg.address, port);
    } else {
        tracing::warn!("UDP listener on port {port}, but no IPv4 address is assigned yet!");
    }

    // One spare byte so an oversized frame is seen as such rather than truncated.
    let mut frame = [0u8; MAX_FRAME_LEN + 1];
    loop {
        match socket.recv_from(&mut frame).await {
            Ok((len, meta)) => {
                let _ = serve_datagram(rover, &frame[..len], meta.endpoint);
            }
            Err(error) => {
                tracing::warn!(?error, "datagram longer than {} bytes dropped", frame.len());
            }
        }
    }
}
