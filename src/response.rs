//! Building and sending responses.

use std::fmt;

use hickory_proto::ProtoError;
use hickory_proto::op::{Edns, Header, Message, ResponseCode};
use hickory_proto::serialize::binary::{BinEncodable as _, BinEncoder};
use hickory_proto::xfer::Protocol;
use hickory_server::{
    authority::MessageResponseBuilder,
    server::{Request, ResponseHandler, ResponseInfo},
};

use crate::rr::{AsHickory as _, Record};

/// Smallest payload every DNS client must accept over UDP.
pub const MIN_UDP_PAYLOAD: u16 = 512;

/// A fully assembled answer to one request.
#[derive(Debug, Clone)]
pub struct ResponseEnvelope {
    header: Header,
    compress: bool,
    answers: Vec<hickory_proto::rr::Record>,
    edns: Option<Edns>,
    max_size: u16,
}

impl ResponseEnvelope {
    /// Assemble an authoritative answer from records in store order.
    ///
    /// Duplicate records are dropped, keeping the position of the first and the
    /// lowest TTL among them. When the encoded message
    /// would exceed the transport limit, trailing answers are removed until it fits
    /// and the truncation flag is set.
    pub fn assemble(request: &Request, records: &[Record]) -> Result<Self, ProtoError> {
        let mut header = Header::response_from_request(request.header());
        header.set_authoritative(true);
        header.set_recursion_available(true);
        header.set_response_code(ResponseCode::NoError);

        let mut unique: Vec<Record> = Vec::with_capacity(records.len());
        for record in records {
            match unique.iter_mut().find(|kept| kept.is_duplicate_of(record)) {
                Some(kept) => kept.clamp_ttl(record.ttl()),
                None => unique.push(record.clone()),
            }
        }
        if unique.len() < records.len() {
            tracing::trace!("dropped {} duplicate records", records.len() - unique.len());
        }

        let edns = request.edns().map(|edns| {
            let mut response = Edns::new();
            response.set_version(0);
            response.set_max_payload(edns.max_payload().max(MIN_UDP_PAYLOAD));
            response.set_dnssec_ok(edns.flags().dnssec_ok);
            response
        });

        let mut envelope = Self {
            header,
            compress: true,
            answers: unique.iter().map(|record| record.as_hickory()).collect(),
            edns,
            max_size: max_size(request),
        };
        envelope.truncate(request)?;
        Ok(envelope)
    }

    fn truncate(&mut self, request: &Request) -> Result<(), ProtoError> {
        let limit = usize::from(self.max_size);
        if self.encoded_len(request, self.answers.len())? <= limit {
            return Ok(());
        }

        // Largest prefix of the answers that fits.
        let (mut fits, mut overflows) = (0, self.answers.len());
        while overflows - fits > 1 {
            let middle = fits + (overflows - fits) / 2;
            if self.encoded_len(request, middle)? <= limit {
                fits = middle;
            } else {
                overflows = middle;
            }
        }

        tracing::debug!(
            "truncating response to {fits} of {} answers to fit {limit} bytes",
            self.answers.len()
        );
        self.answers.truncate(fits);
        self.header.set_truncated(true);
        Ok(())
    }

    fn encoded_len(&self, request: &Request, answers: usize) -> Result<usize, ProtoError> {
        let mut message = Message::new();
        message.set_header(self.header);
        message.add_queries(request.queries().iter().map(|q| q.original().clone()));
        message.add_answers(self.answers[..answers].iter().cloned());
        if let Some(edns) = &self.edns {
            message.set_edns(edns.clone());
        }

        let mut buffer = Vec::with_capacity(usize::from(MIN_UDP_PAYLOAD));
        {
            let mut encoder = BinEncoder::new(&mut buffer);
            encoder.set_canonical_names(!self.compress);
            message.emit(&mut encoder)?;
        }
        Ok(buffer.len())
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn is_compressed(&self) -> bool {
        self.compress
    }

    pub fn answers(&self) -> &[hickory_proto::rr::Record] {
        &self.answers
    }

    pub fn edns(&self) -> Option<&Edns> {
        self.edns.as_ref()
    }

    /// Largest message the requester accepts on this transport.
    pub fn max_size(&self) -> u16 {
        self.max_size
    }

    pub fn is_truncated(&self) -> bool {
        self.header.truncated()
    }
}

fn max_size(request: &Request) -> u16 {
    if request.protocol() != Protocol::Udp {
        return u16::MAX;
    }

    request
        .edns()
        .map(|edns| edns.max_payload().max(MIN_UDP_PAYLOAD))
        .unwrap_or(MIN_UDP_PAYLOAD)
}

pub(crate) async fn send_envelope<R>(
    response_handle: &mut R,
    request: &Request,
    envelope: &ResponseEnvelope,
) -> ResponseInfo
where
    R: ResponseHandler,
{
    tracing::trace!(
        "REPLY {} answers{}",
        envelope.answers.len(),
        if envelope.is_truncated() { " (truncated)" } else { "" }
    );
    let mut response = MessageResponseBuilder::from_message_request(request);
    if let Some(edns) = envelope.edns() {
        response.edns(edns.clone());
    }
    let response = response.build(
        envelope.header,
        envelope.answers.iter(),
        std::iter::empty(),
        std::iter::empty(),
        std::iter::empty(),
    );
    response_handle.send_response(response).await.into_info()
}

pub(crate) async fn send_error<R>(
    response_handle: &mut R,
    request: &Request,
    code: ResponseCode,
) -> ResponseInfo
where
    R: ResponseHandler,
{
    tracing::trace!("REPLY error {code}");
    let response = MessageResponseBuilder::from_message_request(request);
    response_handle
        .send_response(response.error_msg(request.header(), code))
        .await
        .into_info()
}

pub(crate) trait ResponseResultExt {
    fn into_info(self) -> ResponseInfo;
}

impl<E> ResponseResultExt for Result<ResponseInfo, E>
where
    E: fmt::Display,
{
    fn into_info(self) -> ResponseInfo {
        match self {
            Ok(info) => info,
            Err(error) => {
                tracing::warn!("Sending DNS response failed: {error}");
                ResponseInfo::code_serve_failed()
            }
        }
    }
}

pub(crate) trait ResponseInfoExt: Sized {
    fn code_serve_failed() -> Self;
}

impl ResponseInfoExt for ResponseInfo {
    fn code_serve_failed() -> Self {
        let mut header = Header::new();
        header.set_response_code(ResponseCode::ServFail);
        header.into()
    }
}
